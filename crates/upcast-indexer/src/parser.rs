//! Per-thread tree-sitter parser reuse
//!
//! Tree-sitter parsers are not `Sync`, so each thread keeps one parser per
//! language and reuses it. Callers in async code run parsing under
//! `spawn_blocking`; rayon workers get their own parsers automatically.

use crate::languages::FileType;
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tree_sitter::{Parser, Tree};

thread_local! {
    static PARSERS: RefCell<HashMap<FileType, Parser>> = RefCell::new(HashMap::new());
}

/// Parse content with the grammar for `file_type`. `None` when the file type
/// has no grammar or the parser gave up.
pub fn parse(content: &str, file_type: FileType) -> Option<Tree> {
    let language = file_type.language()?;
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        let parser = match parsers.entry(file_type) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                let mut parser = Parser::new();
                if let Err(e) = parser.set_language(&language) {
                    tracing::warn!("Failed to set {} language: {}", file_type.name(), e);
                    return None;
                }
                slot.insert(parser)
            }
        };
        parser.parse(content, None)
    })
}
