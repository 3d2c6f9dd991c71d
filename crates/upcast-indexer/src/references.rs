//! Python import analysis producing dependency pairs

use crate::languages::python::{self, ImportRef};
use crate::languages::FileType;
use crate::parser;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use upcast_core::{CrossReferenceExtractor, ItemId, WorkItem};

/// Resolves `import` / `from ... import` statements to other items in the
/// batch by dotted module name.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonReferences;

impl CrossReferenceExtractor for PythonReferences {
    fn extract(&self, items: &[WorkItem]) -> Vec<(ItemId, ItemId)> {
        let modules = ModuleIndex::new(items);
        tracing::debug!("Indexed {} Python modules", modules.by_name.len());

        let mut pairs: Vec<(ItemId, ItemId)> = items
            .par_iter()
            .filter(|item| FileType::from_path(&item.path) == FileType::Python)
            .flat_map_iter(|item| modules.references_of(item))
            .collect();
        pairs.sort();
        pairs
    }
}

struct ModuleIndex {
    by_name: HashMap<String, ItemId>,
}

impl ModuleIndex {
    fn new(items: &[WorkItem]) -> Self {
        let by_name = items
            .iter()
            .filter(|item| FileType::from_path(&item.path) == FileType::Python)
            .map(|item| (python::module_name(item.id.as_str()), item.id.clone()))
            .filter(|(name, _)| !name.is_empty())
            .collect();
        Self { by_name }
    }

    fn references_of(&self, item: &WorkItem) -> Vec<(ItemId, ItemId)> {
        let Some(content) = item.content() else {
            return Vec::new();
        };
        let Some(tree) = parser::parse(content, FileType::Python) else {
            return Vec::new();
        };

        let package = package_of(item.id.as_str());
        let mut targets = BTreeSet::new();
        for import in python::imports(tree.root_node(), content.as_bytes()) {
            for target in self.resolve(&import, &package) {
                if target != item.id {
                    targets.insert(target);
                }
            }
        }
        targets.into_iter().map(|target| (item.id.clone(), target)).collect()
    }

    /// Items an import refers to. `from a import b` prefers the submodule
    /// `a.b`; otherwise the longest known prefix of the module path wins.
    fn resolve(&self, import: &ImportRef, package: &str) -> Vec<ItemId> {
        let Some(module) = absolute_module(import, package) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        let mut needs_module = import.names.is_empty();
        for name in &import.names {
            let candidate = join(&module, name);
            match self.by_name.get(&candidate) {
                Some(id) => found.push(id.clone()),
                None => needs_module = true,
            }
        }
        if needs_module {
            if let Some(id) = self.longest_prefix(&module) {
                found.push(id.clone());
            }
        }
        found
    }

    fn longest_prefix(&self, module: &str) -> Option<&ItemId> {
        let mut candidate = module;
        loop {
            if let Some(id) = self.by_name.get(candidate) {
                return Some(id);
            }
            candidate = &candidate[..candidate.rfind('.')?];
        }
    }
}

/// The package a module's relative imports are resolved against.
fn package_of(relative: &str) -> String {
    let module = python::module_name(relative);
    if python::is_package(relative) {
        return module;
    }
    match module.rfind('.') {
        Some(dot) => module[..dot].to_string(),
        None => String::new(),
    }
}

/// Absolute dotted module of an import, or `None` when a relative import
/// climbs above the top-level package.
fn absolute_module(import: &ImportRef, package: &str) -> Option<String> {
    if import.level == 0 {
        return Some(import.module.clone());
    }
    let mut base: Vec<&str> = if package.is_empty() {
        Vec::new()
    } else {
        package.split('.').collect()
    };
    for _ in 1..import.level {
        base.pop()?;
    }
    Some(join(&base.join("."), &import.module))
}

fn join(prefix: &str, name: &str) -> String {
    match (prefix.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{}.{}", prefix, name),
    }
}
