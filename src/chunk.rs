//! Budget-bounded chunk assembly.
//!
//! Splits a function (or a whole file) into chunks whose measured token
//! count fits the configured budget. Splits happen only at legal
//! boundaries: statement starts inside a function body, blank lines in
//! whole-file mode. Chunks cover contiguous byte ranges, so concatenating a
//! subject's chunk texts reproduces its source exactly and nothing is ever
//! silently dropped.
//!
//! A single statement larger than the whole budget is split at line
//! boundaries as a last resort, never discarded.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::{Chunk, FunctionSpan};

/// Token measurement used when a backend offers nothing better: roughly
/// four characters per token.
pub fn default_token_estimate(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Chunk one extracted function.
///
/// The function header stays attached to the first body statement; further
/// splits happen only at statement starts.
pub fn chunk_function(
    source: &str,
    span: &FunctionSpan,
    unit_path: &str,
    max_tokens: usize,
    measure: &dyn Fn(&str) -> usize,
) -> Result<Vec<Chunk>> {
    let text = span.slice(source);
    if text.trim().is_empty() {
        return Err(Error::Chunking(format!(
            "function {} in {} has no text",
            span.name, unit_path
        )));
    }

    // Statement starts relative to the span. The first statement never
    // becomes a boundary: the header merges with the first statement group.
    let breaks: Vec<usize> = span
        .statement_starts
        .iter()
        .skip(1)
        .filter_map(|&b| b.checked_sub(span.start_byte))
        .filter(|&b| b > 0 && b < text.len())
        .collect();

    let pieces = pack_ranges(text, &breaks, max_tokens, measure);
    Ok(build_chunks(pieces, unit_path, Some(&span.name)))
}

/// Chunk a whole file, for units that contain no function definitions.
///
/// Legal boundaries are the positions following blank lines.
pub fn chunk_whole_file(
    text: &str,
    unit_path: &str,
    max_tokens: usize,
    measure: &dyn Fn(&str) -> usize,
) -> Result<Vec<Chunk>> {
    if text.trim().is_empty() {
        return Err(Error::Chunking(format!("{} has no text", unit_path)));
    }

    let breaks = blank_line_breaks(text);
    let pieces = pack_ranges(text, &breaks, max_tokens, measure);
    Ok(build_chunks(pieces, unit_path, None))
}

/// Byte offsets immediately after each blank line.
fn blank_line_breaks(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut breaks = Vec::new();
    for i in 0..bytes.len().saturating_sub(1) {
        if bytes[i] == b'\n' && bytes[i + 1] == b'\n' {
            let after = i + 2;
            if after < bytes.len() {
                breaks.push(after);
            }
        }
    }
    breaks
}

/// Greedily pack contiguous ranges of `text` into budget-bounded pieces.
///
/// `breaks` are the legal split offsets, ascending. Every returned piece is
/// an exact substring of `text` and their concatenation equals `text`. A
/// single range that alone exceeds the budget is line-split as a fallback.
fn pack_ranges(
    text: &str,
    breaks: &[usize],
    max_tokens: usize,
    measure: &dyn Fn(&str) -> usize,
) -> Vec<String> {
    let mut boundaries: Vec<usize> = breaks
        .iter()
        .copied()
        .filter(|&b| b > 0 && b < text.len() && text.is_char_boundary(b))
        .collect();
    boundaries.sort_unstable();
    boundaries.dedup();
    boundaries.push(text.len());

    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut end = 0usize;

    for &next in &boundaries {
        if end > start && measure(&text[start..next]) > max_tokens {
            pieces.push(text[start..end].to_string());
            start = end;
        }
        end = next;

        // A lone range over budget cannot wait for a better boundary.
        if measure(&text[start..end]) > max_tokens {
            pieces.extend(hard_split(&text[start..end], max_tokens, measure));
            start = end;
        }
    }
    if end > start {
        pieces.push(text[start..end].to_string());
    }
    pieces
}

/// Last-resort split of an oversized range at line boundaries, then at
/// character boundaries for a single oversized line. Always makes progress.
fn hard_split(text: &str, max_tokens: usize, measure: &dyn Fn(&str) -> usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for line in text.split_inclusive('\n') {
        if !current.is_empty() && measure(&(current.clone() + line)) > max_tokens {
            pieces.push(std::mem::take(&mut current));
        }
        if measure(line) > max_tokens {
            pieces.extend(split_line(line, max_tokens, measure));
        } else {
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn split_line(line: &str, max_tokens: usize, measure: &dyn Fn(&str) -> usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = line;
    while !rest.is_empty() {
        let mut cut = rest.len();
        while cut > 0 && (!rest.is_char_boundary(cut) || measure(&rest[..cut]) > max_tokens) {
            cut -= 1;
        }
        if cut == 0 {
            // Budget smaller than one character; emit a character anyway.
            cut = rest
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
        } else if let Some(space) = rest[..cut].rfind(' ') {
            if space > 0 && cut < rest.len() {
                cut = space + 1;
            }
        }
        pieces.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    pieces
}

fn build_chunks(pieces: Vec<String>, unit_path: &str, function: Option<&str>) -> Vec<Chunk> {
    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let hash = format!("{:x}", Sha256::digest(text.as_bytes()));
            Chunk {
                unit_path: unit_path.to_string(),
                function: function.map(str::to_string),
                index,
                text,
                hash,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::FunctionExtractor;

    fn measure(text: &str) -> usize {
        default_token_estimate(text)
    }

    fn extract_one(source: &str) -> FunctionSpan {
        let spans = FunctionExtractor::new().unwrap().extract(source).unwrap();
        spans.into_iter().next().unwrap()
    }

    #[test]
    fn test_small_function_is_one_chunk() {
        let source = "def f(a):\n    return a\n";
        let span = extract_one(source);
        let chunks = chunk_function(source, &span, "a.py", 512, &measure).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, span.slice(source));
        assert_eq!(chunks[0].function.as_deref(), Some("f"));
    }

    #[test]
    fn test_split_preserves_text_and_budget() {
        let mut source = String::from("def big(x):\n");
        for i in 0..40 {
            source.push_str(&format!("    v{i} = x + {i}\n"));
        }
        let span = extract_one(&source);
        let chunks = chunk_function(&source, &span, "a.py", 30, &measure).unwrap();
        assert!(chunks.len() > 1);

        // Contiguous indices, budget respected, lossless concatenation.
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(measure(&chunk.text) <= 30);
        }
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, span.slice(&source));
    }

    #[test]
    fn test_header_stays_with_first_statement() {
        let source = "def f(x):\n    a = x\n    b = a\n    return b\n";
        let span = extract_one(source);
        // Budget forces a split after every statement group.
        let chunks = chunk_function(source, &span, "a.py", 6, &measure).unwrap();
        assert!(chunks[0].text.starts_with("def f(x):\n    a = x"));
    }

    #[test]
    fn test_oversized_statement_line_split() {
        let long_value = "'a'".repeat(200);
        let source = format!("def f():\n    data = {}\n    return data\n", long_value);
        let span = extract_one(&source);
        let chunks = chunk_function(&source, &span, "a.py", 20, &measure).unwrap();
        assert!(chunks.len() > 2);
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, span.slice(&source));
    }

    #[test]
    fn test_whole_file_splits_at_blank_lines() {
        let text = "x = 1\ny = 2\n\nz = 3\nw = 4\n\nq = 5\n";
        let chunks = chunk_whole_file(text, "a.py", 4, &measure).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.function.is_none()));
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_empty_text_rejected() {
        let err = chunk_whole_file("   \n\n  ", "a.py", 100, &measure).unwrap_err();
        assert!(matches!(err, Error::Chunking(_)));
    }

    #[test]
    fn test_deterministic() {
        let mut source = String::from("def f():\n");
        for i in 0..20 {
            source.push_str(&format!("    a{i} = {i}\n"));
        }
        let span = extract_one(&source);
        let first = chunk_function(&source, &span, "a.py", 25, &measure).unwrap();
        let second = chunk_function(&source, &span, "a.py", 25, &measure).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].hash, second[0].hash);
    }
}
