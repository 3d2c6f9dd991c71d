//! Structural syntax checks

use crate::languages::FileType;
use crate::parser;
use tree_sitter::Node;

/// First syntax problem found in a source text. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{language} syntax error at line {line}, column {column}: {detail}")]
pub struct SyntaxError {
    pub language: &'static str,
    pub line: usize,
    pub column: usize,
    pub detail: String,
}

/// Check that `content` parses cleanly. File types without a grammar always pass.
pub fn check_syntax(content: &str, file_type: FileType) -> Result<(), SyntaxError> {
    if file_type.language().is_none() {
        return Ok(());
    }
    let Some(tree) = parser::parse(content, file_type) else {
        return Err(SyntaxError {
            language: file_type.name(),
            line: 1,
            column: 1,
            detail: "parser produced no tree".to_string(),
        });
    };

    let root = tree.root_node();
    if !root.has_error() {
        return Ok(());
    }
    let problem = first_problem(root).unwrap_or(root);
    let position = problem.start_position();
    Err(SyntaxError {
        language: file_type.name(),
        line: position.row + 1,
        column: position.column + 1,
        detail: describe(problem, content),
    })
}

/// Depth-first, source-ordered search for the first error or missing node.
fn first_problem(root: Node<'_>) -> Option<Node<'_>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    None
}

fn describe(node: Node<'_>, content: &str) -> String {
    if node.is_missing() {
        return format!("missing `{}`", node.kind());
    }
    let text = node.utf8_text(content.as_bytes()).unwrap_or_default();
    let first_line = text.lines().next().unwrap_or_default().trim();
    if first_line.is_empty() {
        return "unexpected end of input".to_string();
    }
    let snippet: String = first_line.chars().take(40).collect();
    format!("unexpected `{}`", snippet)
}
