//! # Codebrief
//!
//! A source-code summarization pipeline.
//!
//! Codebrief harvests Python source from a local directory or a GitHub
//! repository, extracts function-level spans, assembles token-budget-bounded
//! chunks, routes them through a hosted summarization backend, and produces
//! an ordered batch report of per-function summaries.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌───────────┐
//! │  Providers  │──▶│  Pipeline    │──▶│ Backends  │
//! │  FS/GitHub  │   │ Parse+Chunk │   │ BART/T5   │
//! └─────────────┘   └──────┬──────┘   └───────────┘
//!                          │
//!                          ▼
//!                   ┌─────────────┐
//!                   │ BatchReport │
//!                   │ (text/JSON) │
//!                   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! codebrief sources             # list configured source units
//! codebrief backends            # list registered backends
//! codebrief run                 # summarize everything
//! codebrief run --json          # machine-readable report
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`provider_fs`] | Local filesystem provider |
//! | [`provider_github`] | GitHub contents API provider |
//! | [`extract`] | Function extraction via tree-sitter |
//! | [`chunk`] | Budget-bounded chunk assembly |
//! | [`backend`] | Summarization backends |
//! | [`run`] | Batch orchestration and reporting |

pub mod backend;
pub mod chunk;
pub mod config;
pub mod error;
pub mod extract;
pub mod models;
pub mod provider;
pub mod provider_fs;
pub mod provider_github;
pub mod run;
pub mod sources;
