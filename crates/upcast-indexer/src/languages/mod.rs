//! Per-language tree-sitter tables

pub mod python;

use std::path::Path;
use tree_sitter::{Language, Node};

/// Supported file types for parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Rust,
    TypeScript,
    JavaScript,
    Python,
    Go,
    Java,
    C,
    Cpp,
    Generic,
}

impl FileType {
    /// Determine file type from file extension
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return FileType::Generic;
        };
        match ext {
            "rs" => FileType::Rust,
            "ts" | "tsx" => FileType::TypeScript,
            "js" | "jsx" | "mjs" => FileType::JavaScript,
            "py" | "pyi" => FileType::Python,
            "go" => FileType::Go,
            "java" => FileType::Java,
            "c" => FileType::C,
            "cpp" | "cc" | "cxx" | "h" | "hpp" => FileType::Cpp,
            _ => FileType::Generic,
        }
    }

    /// Tree-sitter grammar, if the language has one.
    pub fn language(&self) -> Option<Language> {
        let language = match self {
            FileType::Rust => tree_sitter_rust::LANGUAGE.into(),
            FileType::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            FileType::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            FileType::Python => tree_sitter_python::LANGUAGE.into(),
            FileType::Go => tree_sitter_go::LANGUAGE.into(),
            FileType::Java => tree_sitter_java::LANGUAGE.into(),
            FileType::C => tree_sitter_c::LANGUAGE.into(),
            FileType::Cpp => tree_sitter_cpp::LANGUAGE.into(),
            FileType::Generic => return None,
        };
        Some(language)
    }

    pub fn name(&self) -> &'static str {
        match self {
            FileType::Rust => "rust",
            FileType::TypeScript => "typescript",
            FileType::JavaScript => "javascript",
            FileType::Python => "python",
            FileType::Go => "go",
            FileType::Java => "java",
            FileType::C => "c",
            FileType::Cpp => "cpp",
            FileType::Generic => "generic",
        }
    }

    /// Top-level node kinds that form a self-contained declaration chunk.
    pub fn declaration_kinds(&self) -> &'static [&'static str] {
        match self {
            FileType::Python => python::DECLARATION_KINDS,
            FileType::Rust => &[
                "function_item",
                "struct_item",
                "enum_item",
                "union_item",
                "impl_item",
                "trait_item",
                "mod_item",
                "const_item",
                "static_item",
                "type_item",
                "macro_definition",
            ],
            FileType::JavaScript => &[
                "function_declaration",
                "generator_function_declaration",
                "class_declaration",
                "lexical_declaration",
                "variable_declaration",
                "export_statement",
            ],
            FileType::TypeScript => &[
                "function_declaration",
                "generator_function_declaration",
                "class_declaration",
                "abstract_class_declaration",
                "interface_declaration",
                "type_alias_declaration",
                "enum_declaration",
                "lexical_declaration",
                "variable_declaration",
                "export_statement",
            ],
            FileType::Go => &[
                "function_declaration",
                "method_declaration",
                "type_declaration",
                "const_declaration",
                "var_declaration",
            ],
            FileType::Java => &[
                "class_declaration",
                "interface_declaration",
                "enum_declaration",
                "record_declaration",
                "annotation_type_declaration",
            ],
            FileType::C => &[
                "function_definition",
                "struct_specifier",
                "enum_specifier",
                "union_specifier",
                "type_definition",
                "declaration",
            ],
            FileType::Cpp => &[
                "function_definition",
                "class_specifier",
                "struct_specifier",
                "enum_specifier",
                "union_specifier",
                "type_definition",
                "namespace_definition",
                "template_declaration",
                "declaration",
            ],
            FileType::Generic => &[],
        }
    }

    /// Top-level node kinds copied into every chunk's context preamble.
    pub fn import_kinds(&self) -> &'static [&'static str] {
        match self {
            FileType::Python => python::IMPORT_KINDS,
            FileType::Rust => &["use_declaration", "extern_crate_declaration"],
            FileType::JavaScript | FileType::TypeScript => &["import_statement"],
            FileType::Go => &["package_clause", "import_declaration"],
            FileType::Java => &["package_declaration", "import_declaration"],
            FileType::C => &["preproc_include"],
            FileType::Cpp => &["preproc_include", "using_declaration"],
            FileType::Generic => &[],
        }
    }
}

/// Name of a declaration node, looking through wrappers such as Python
/// decorators or JavaScript `export`.
pub fn declaration_name(node: Node<'_>, source: &[u8]) -> Option<String> {
    let mut current = node;
    for _ in 0..4 {
        if let Some(name) = current.child_by_field_name("name") {
            return name.utf8_text(source).ok().map(str::to_string);
        }
        let inner = current
            .child_by_field_name("definition")
            .or_else(|| current.child_by_field_name("declaration"))
            .or_else(|| current.child_by_field_name("declarator"))?;
        if inner.kind() == "identifier" {
            return inner.utf8_text(source).ok().map(str::to_string);
        }
        current = inner;
    }
    None
}
