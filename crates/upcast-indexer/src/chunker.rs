//! Split oversized sources into independently transformable chunks

use crate::languages::{FileType, declaration_name};
use crate::parser;
use std::collections::HashSet;
use tree_sitter::Node;
use upcast_core::{Chunk, ChunkKind};

/// Top-level span of source lines, before it becomes one or more chunks.
enum Span {
    Declaration { start: usize, end: usize, name: String },
    /// Consecutive top-level statements that are neither imports nor declarations.
    Statements { start: usize, end: usize },
}

/// Splits source text along top-level declarations.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_lines: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(300)
    }
}

impl Chunker {
    pub fn new(max_lines: usize) -> Self {
        Self { max_lines: max_lines.max(1) }
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Chunks in source order. The file head and every top-level import
    /// become the shared context of every declaration chunk; declarations over the line budget are split into
    /// partial chunks. Sources that fail to parse are split by line count.
    pub fn chunk(&self, content: &str, file_type: FileType) -> Vec<Chunk> {
        let lines: Vec<&str> = content.split('\n').collect();

        let Some(tree) = parser::parse(content, file_type) else {
            return self.by_lines(&lines);
        };
        let root = tree.root_node();
        if root.has_error() {
            tracing::debug!("{} source has syntax errors, chunking by lines", file_type.name());
            return self.by_lines(&lines);
        }

        let declaration_kinds = file_type.declaration_kinds();
        let import_kinds = file_type.import_kinds();
        let source = content.as_bytes();

        // Top-level nodes as non-overlapping line ranges
        let mut nodes: Vec<(Node, usize, usize)> = Vec::new();
        let mut next_free = 0usize;
        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            let start = node.start_position().row.max(next_free);
            let end_position = node.end_position();
            let end = if end_position.column == 0 && end_position.row > start {
                end_position.row
            } else {
                end_position.row + 1
            }
            .min(lines.len());
            if start >= end {
                continue;
            }
            next_free = end;
            nodes.push((node, start, end));
        }

        let Some(first_declaration) = nodes
            .iter()
            .position(|(node, ..)| declaration_kinds.contains(&node.kind()))
        else {
            return vec![Chunk {
                kind: ChunkKind::WholeFile,
                name: "entire_file".to_string(),
                content: content.to_string(),
                context: String::new(),
                start_line: 0,
                end_line: lines.len(),
            }];
        };

        // The head of the file up to the last import before the first
        // declaration stays on top verbatim, so coding lines and the module
        // docstring keep their position. Without imports only leading
        // comments and docstrings form the head.
        let head = &nodes[..first_declaration];
        let preamble = match head.iter().rposition(|(node, ..)| import_kinds.contains(&node.kind())) {
            Some(last_import) => last_import + 1,
            None => head.iter().take_while(|(node, ..)| is_header(node)).count(),
        };
        let mut context = match preamble {
            0 => String::new(),
            n => lines[..nodes[n - 1].2].join("\n").trim_end().to_string(),
        };

        let mut spans: Vec<Span> = Vec::new();
        let mut run_open = false;
        for &(node, start, end) in &nodes[preamble..] {
            let kind = node.kind();
            if import_kinds.contains(&kind) {
                if !context.is_empty() {
                    context.push('\n');
                }
                context.push_str(&lines[start..end].join("\n"));
                run_open = false;
            } else if declaration_kinds.contains(&kind) {
                let name = declaration_name(node, source)
                    .unwrap_or_else(|| format!("{}_{}", kind, start));
                spans.push(Span::Declaration { start, end, name });
                run_open = false;
            } else {
                match spans.last_mut() {
                    Some(Span::Statements { end: run_end, .. }) if run_open => *run_end = end,
                    _ => spans.push(Span::Statements { start, end }),
                }
                run_open = true;
            }
        }

        let mut chunks = Vec::new();
        for span in spans {
            let (start, end, name) = match span {
                Span::Declaration { start, end, name } => (start, end, name),
                Span::Statements { start, end } => (start, end, format!("toplevel_{}", start)),
            };
            if end - start > self.max_lines {
                chunks.extend(self.split(&lines, start, end, &context));
            } else {
                chunks.push(Chunk {
                    kind: ChunkKind::Declaration,
                    name,
                    content: lines[start..end].join("\n"),
                    context: context.clone(),
                    start_line: start,
                    end_line: end,
                });
            }
        }
        chunks
    }

    /// Contiguous slices of at most `max_lines` lines of one oversized span.
    fn split(&self, lines: &[&str], start: usize, end: usize, context: &str) -> Vec<Chunk> {
        (start..end)
            .step_by(self.max_lines)
            .map(|from| {
                let to = (from + self.max_lines).min(end);
                Chunk {
                    kind: ChunkKind::Partial,
                    name: format!("partial_{}", from),
                    content: lines[from..to].join("\n"),
                    context: context.to_string(),
                    start_line: from,
                    end_line: to,
                }
            })
            .collect()
    }

    /// Fallback when the source cannot be parsed: fixed-size line ranges with
    /// no context.
    fn by_lines(&self, lines: &[&str]) -> Vec<Chunk> {
        (0..lines.len())
            .step_by(self.max_lines)
            .map(|from| {
                let to = (from + self.max_lines).min(lines.len());
                Chunk {
                    kind: ChunkKind::LineRange,
                    name: format!("lines_{}_{}", from, to),
                    content: lines[from..to].join("\n"),
                    context: String::new(),
                    start_line: from,
                    end_line: to,
                }
            })
            .collect()
    }

    /// Rebuild a full source: the context once, then every chunk body in
    /// order, separated by a blank line.
    pub fn reassemble(&self, outputs: &[String], context: &str) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(outputs.len() + 1);
        if !context.trim().is_empty() {
            parts.push(context.trim_end().to_string());
        }
        for output in outputs {
            let body = strip_context(output, context);
            if !body.is_empty() {
                parts.push(body);
            }
        }
        let mut joined = parts.join("\n\n");
        joined.push('\n');
        joined
    }
}

/// Remove a copy of the shared context from the top of a chunk output. When
/// the output does not open with the context verbatim, leading lines that
/// repeat a context line are dropped instead. Text further down is never
/// touched.
pub fn strip_context(output: &str, context: &str) -> String {
    let context = context.trim();
    if context.is_empty() {
        return trim_blank_lines(output).to_string();
    }

    let lead = trim_blank_lines(output);
    let leading = lead.trim_start();
    if let Some(rest) = leading.strip_prefix(context) {
        if rest.is_empty() || rest.starts_with('\n') || rest.starts_with("\r\n") {
            return trim_blank_lines(rest).to_string();
        }
    }

    let known: HashSet<&str> = context.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let body: Vec<&str> = output
        .lines()
        .skip_while(|line| {
            let line = line.trim();
            line.is_empty() || known.contains(line)
        })
        .collect();
    trim_blank_lines(&body.join("\n")).to_string()
}

/// Drop leading blank lines and trailing whitespace, keeping the first line's
/// indentation.
fn trim_blank_lines(text: &str) -> &str {
    let Some(first) = text.find(|c: char| !c.is_whitespace()) else {
        return "";
    };
    let line_start = text[..first].rfind('\n').map_or(0, |n| n + 1);
    text[line_start..].trim_end()
}

/// Comments and bare string statements (module docstrings).
fn is_header(node: &Node) -> bool {
    if node.kind().contains("comment") {
        return true;
    }
    if node.kind() != "expression_statement" {
        return false;
    }
    let mut cursor = node.walk();
    let mut children = node.named_children(&mut cursor);
    matches!((children.next(), children.next()), (Some(child), None) if child.kind() == "string")
}
