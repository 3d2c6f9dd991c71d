//! Python module naming and import extraction using tree-sitter

use tree_sitter::Node;

pub const DECLARATION_KINDS: &[&str] = &[
    "function_definition",
    "class_definition",
    "decorated_definition",
];

pub const IMPORT_KINDS: &[&str] = &[
    "import_statement",
    "import_from_statement",
    "future_import_statement",
];

/// One import statement target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    /// Dotted module path as written, without leading dots. Empty for `from . import x`.
    pub module: String,
    /// Names imported by a `from` import. Empty for plain `import a.b`.
    pub names: Vec<String>,
    /// Number of leading dots; 0 for absolute imports.
    pub level: usize,
}

/// Dotted module name for a repository-relative path: `pkg/sub/mod.py` is
/// `pkg.sub.mod` and `pkg/__init__.py` is `pkg`.
pub fn module_name(relative: &str) -> String {
    let stem = relative
        .strip_suffix(".pyi")
        .or_else(|| relative.strip_suffix(".py"))
        .unwrap_or(relative);
    let dotted = stem.replace(['/', '\\'], ".");
    match dotted.strip_suffix(".__init__") {
        Some(package) => package.to_string(),
        None if dotted == "__init__" => String::new(),
        None => dotted,
    }
}

/// True when the path is a package initializer.
pub fn is_package(relative: &str) -> bool {
    relative.ends_with("__init__.py") || relative.ends_with("__init__.pyi")
}

/// Every import in the tree, including ones nested in functions or `try`
/// blocks.
pub fn imports(root: Node<'_>, source: &[u8]) -> Vec<ImportRef> {
    let mut found = Vec::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        match node.kind() {
            "import_statement" => {
                let mut cursor = node.walk();
                for name in node.children_by_field_name("name", &mut cursor) {
                    if let Some(module) = dotted_text(name, source) {
                        found.push(ImportRef { module, names: Vec::new(), level: 0 });
                    }
                }
            }
            "import_from_statement" => {
                if let Some(import) = from_import(node, source) {
                    found.push(import);
                }
            }
            _ => {
                let mut cursor = node.walk();
                let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
                stack.extend(children.into_iter().rev());
            }
        }
    }
    found
}

fn from_import(node: Node<'_>, source: &[u8]) -> Option<ImportRef> {
    let target = node.child_by_field_name("module_name")?;
    let (module, level) = if target.kind() == "relative_import" {
        let mut level = 0;
        let mut module = String::new();
        let mut cursor = target.walk();
        for child in target.children(&mut cursor) {
            match child.kind() {
                "import_prefix" => {
                    level = child.utf8_text(source).ok()?.chars().filter(|c| *c == '.').count();
                }
                "dotted_name" => module = child.utf8_text(source).ok()?.to_string(),
                _ => {}
            }
        }
        (module, level)
    } else {
        (target.utf8_text(source).ok()?.to_string(), 0)
    };

    let mut cursor = node.walk();
    let names = node
        .children_by_field_name("name", &mut cursor)
        .filter_map(|n| dotted_text(n, source))
        .collect();

    Some(ImportRef { module, names, level })
}

/// The dotted name of `a.b` or `a.b as c`.
fn dotted_text(node: Node<'_>, source: &[u8]) -> Option<String> {
    let name = match node.kind() {
        "aliased_import" => node.child_by_field_name("name")?,
        _ => node,
    };
    name.utf8_text(source).ok().map(str::to_string)
}
