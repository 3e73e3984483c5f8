//! Function extraction from Python source.
//!
//! Parses a unit's text with tree-sitter and locates every function
//! definition, including nested and async ones, in document order. Each
//! span records the exact byte range of the definition, so slicing the unit
//! text reproduces the function source losslessly, plus the byte offsets of
//! the body's top-level statements for budget-aware splitting.
//!
//! A file whose parse tree contains syntax errors is rejected as a whole;
//! partial extraction from broken trees produces misleading spans.

use tree_sitter::{Node, Parser};

use crate::error::{Error, Result};
use crate::models::FunctionSpan;

pub struct FunctionExtractor {
    parser: Parser,
}

impl FunctionExtractor {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| Error::Parse(format!("failed to load Python grammar: {}", e)))?;
        Ok(Self { parser })
    }

    /// Extract all function definitions from `source`, in document order.
    ///
    /// Returns an empty vector for a valid file with no functions. Returns
    /// [`Error::Parse`] when the source does not parse cleanly.
    pub fn extract(&mut self, source: &str) -> Result<Vec<FunctionSpan>> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| Error::Parse("parser returned no tree".to_string()))?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(Error::Parse("source contains syntax errors".to_string()));
        }

        let mut spans = Vec::new();
        collect_functions(root, source, &mut spans)?;
        Ok(spans)
    }
}

/// Pre-order walk collecting every `function_definition`, so nested
/// functions follow their enclosing function.
fn collect_functions(node: Node, source: &str, spans: &mut Vec<FunctionSpan>) -> Result<()> {
    if node.kind() == "function_definition" {
        spans.push(span_for(node, source)?);
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_functions(child, source, spans)?;
    }
    Ok(())
}

fn span_for(node: Node, source: &str) -> Result<FunctionSpan> {
    let name_node = node
        .child_by_field_name("name")
        .ok_or_else(|| Error::Parse("function definition without a name".to_string()))?;
    let name = node_text(name_node, source)?.to_string();

    let params = node
        .child_by_field_name("parameters")
        .map(|p| parameter_names(p, source))
        .transpose()?
        .unwrap_or_default();

    // Direct body statements are the legal split points.
    let statement_starts = node
        .child_by_field_name("body")
        .map(|body| {
            let mut cursor = body.walk();
            body.named_children(&mut cursor)
                .map(|stmt| stmt.start_byte())
                .collect()
        })
        .unwrap_or_default();

    Ok(FunctionSpan {
        name,
        params,
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        statement_starts,
    })
}

/// Parameter names in declaration order, unwrapping type annotations,
/// defaults, and splat markers down to the bare identifier.
fn parameter_names(params: Node, source: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        match param.kind() {
            "identifier" => {
                names.push(node_text(param, source)?.to_string());
            }
            "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                if let Some(ident) = first_identifier(param) {
                    names.push(node_text(ident, source)?.to_string());
                }
            }
            "default_parameter" | "typed_default_parameter" => {
                if let Some(name) = param.child_by_field_name("name") {
                    if let Some(ident) = if name.kind() == "identifier" {
                        Some(name)
                    } else {
                        first_identifier(name)
                    } {
                        names.push(node_text(ident, source)?.to_string());
                    }
                }
            }
            // Positional-only and keyword-only separators carry no name.
            "positional_separator" | "keyword_separator" => {}
            other => {
                log::debug!("unhandled parameter kind: {}", other);
            }
        }
    }
    Ok(names)
}

fn first_identifier(node: Node) -> Option<Node> {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "identifier" {
            return Some(child);
        }
        if let Some(found) = first_identifier(child) {
            return Some(found);
        }
    }
    None
}

fn node_text<'a>(node: Node, source: &'a str) -> Result<&'a str> {
    node.utf8_text(source.as_bytes())
        .map_err(|e| Error::Parse(format!("invalid UTF-8 in parse tree: {}", e)))
}
