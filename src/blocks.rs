//! Syntax-aware segmentation of Python source into function-level blocks.

use std::cell::RefCell;
use std::collections::HashMap;

use tree_sitter::{Node, Parser};

use crate::error::{Error, Result};

thread_local! {
    static PYTHON_PARSER: RefCell<std::result::Result<Parser, String>> =
        RefCell::new(python_parser());
}

/// A parser loaded with the Python grammar, or why the grammar was rejected.
pub fn python_parser() -> std::result::Result<Parser, String> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| e.to_string())?;
    Ok(parser)
}

/// A named function or method span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBlock {
    /// Qualified name (`Class.method`); repeated definitions get `name#2`, `name#3`, ...
    pub key: String,
    /// 1-based, inclusive, decorators included.
    pub start_line: usize,
    pub end_line: usize,
    /// Source text, dedented to column zero.
    pub text: String,
    /// Token stream used for comparison, blind to whitespace and comments.
    pub normalized: String,
}

/// Split `source` into function blocks in source order.
///
/// Fails when the parser reports syntax errors, since block boundaries would
/// not be trustworthy.
pub fn segment(source: &str) -> Result<Vec<FunctionBlock>> {
    let tree = PYTHON_PARSER.with(|cell| match &mut *cell.borrow_mut() {
        Ok(parser) => parser
            .parse(source, None)
            .ok_or_else(|| Error::Segmentation("python parser produced no tree".to_string())),
        Err(cause) => Err(Error::Segmentation(format!(
            "python grammar could not be loaded: {cause}"
        ))),
    })?;

    let root = tree.root_node();
    if root.has_error() {
        return Err(Error::Segmentation(format!(
            "source has syntax errors (first near line {})",
            first_error_line(root).unwrap_or(1)
        )));
    }

    let mut blocks = Vec::new();
    let mut seen = HashMap::new();
    collect(root, source, "", &mut blocks, &mut seen);
    Ok(blocks)
}

/// Blocks of `new` that are absent from `old` or differ from it after normalization.
///
/// Blocks that exist only in `old` are not reported.
pub fn changed_blocks<'a>(old: &[FunctionBlock], new: &'a [FunctionBlock]) -> Vec<&'a FunctionBlock> {
    let old_by_key: HashMap<&str, &FunctionBlock> =
        old.iter().map(|b| (b.key.as_str(), b)).collect();
    new.iter()
        .filter(|block| {
            old_by_key
                .get(block.key.as_str())
                .is_none_or(|prev| prev.normalized != block.normalized)
        })
        .collect()
}

/// Innermost block containing a 1-based line.
pub fn enclosing_block(blocks: &[FunctionBlock], line: usize) -> Option<&FunctionBlock> {
    blocks
        .iter()
        .filter(|b| b.start_line <= line && line <= b.end_line)
        .min_by_key(|b| b.end_line - b.start_line)
}

fn collect(
    node: Node,
    source: &str,
    prefix: &str,
    out: &mut Vec<FunctionBlock>,
    seen: &mut HashMap<String, usize>,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        let (definition, span) = match child.kind() {
            "decorated_definition" => match child.child_by_field_name("definition") {
                Some(def) => (def, child),
                None => continue,
            },
            "function_definition" | "class_definition" => (child, child),
            _ => continue,
        };
        let Some(name_node) = definition.child_by_field_name("name") else {
            continue;
        };
        let name = &source[name_node.byte_range()];
        let qualified = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };

        match definition.kind() {
            "function_definition" => {
                let count = seen.entry(qualified.clone()).or_insert(0);
                *count += 1;
                let key = if *count == 1 {
                    qualified
                } else {
                    format!("{qualified}#{count}")
                };
                out.push(FunctionBlock {
                    key,
                    start_line: span.start_position().row + 1,
                    end_line: span.end_position().row + 1,
                    text: block_text(span, source),
                    normalized: normalize(span, source),
                });
            }
            "class_definition" => {
                if let Some(body) = definition.child_by_field_name("body") {
                    collect(body, source, &qualified, out, seen);
                }
            }
            _ => {}
        }
    }
}

fn block_text(span: Node, source: &str) -> String {
    let start = span.start_byte();
    let line_start = source[..start].rfind('\n').map_or(0, |i| i + 1);
    let indent = span.start_position().column;
    source[line_start..span.end_byte()]
        .lines()
        .map(|line| {
            let strip = line
                .char_indices()
                .take(indent)
                .take_while(|(_, c)| *c == ' ' || *c == '\t')
                .count();
            &line[strip..]
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize(node: Node, source: &str) -> String {
    let mut tokens = Vec::new();
    push_tokens(node, source, &mut tokens);
    tokens.join(" ")
}

fn push_tokens<'s>(node: Node, source: &'s str, tokens: &mut Vec<&'s str>) {
    match node.kind() {
        "comment" | "line_continuation" => return,
        // String internals are not fully covered by child nodes; keep them whole.
        "string" => {
            tokens.push(&source[node.byte_range()]);
            return;
        }
        _ => {}
    }
    if node.child_count() == 0 {
        let text = source[node.byte_range()].trim();
        if !text.is_empty() {
            tokens.push(text);
        }
        return;
    }

    let nested = node.kind() == "block";
    if nested {
        tokens.push("{");
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        push_tokens(child, source, tokens);
    }
    if nested {
        tokens.push("}");
    }
}

fn first_error_line(node: Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error()
            && let Some(line) = first_error_line(child)
        {
            return Some(line);
        }
    }
    None
}
