//! Unit tests for upcast-indexer module

use crate::*;
use std::path::{Path, PathBuf};
use upcast_core::{ChunkKind, CrossReferenceExtractor, ItemId, WorkItem};

fn py(id: &str, content: &str) -> WorkItem {
    WorkItem::new(id, format!("/repo/{}", id), content)
}

#[test]
fn test_file_type_detection() {
    let cases = [
        ("main.rs", FileType::Rust),
        ("app.ts", FileType::TypeScript),
        ("index.js", FileType::JavaScript),
        ("lib.py", FileType::Python),
        ("main.go", FileType::Go),
        ("Main.java", FileType::Java),
        ("main.c", FileType::C),
        ("main.cpp", FileType::Cpp),
        ("unknown.xyz", FileType::Generic),
        ("Makefile", FileType::Generic),
    ];
    for (name, expected) in cases {
        assert_eq!(FileType::from_path(Path::new(name)), expected, "{}", name);
    }
    assert!(FileType::Generic.language().is_none());
    assert!(FileType::Python.language().is_some());
}

// ── Syntax checks ───────────────────────────────────────────

#[test]
fn test_check_syntax_accepts_valid_python() {
    let source = "import os\n\ndef main():\n    return os.getcwd()\n";
    assert!(check_syntax(source, FileType::Python).is_ok());
}

#[test]
fn test_check_syntax_reports_location() {
    let source = "x = 1\ndef broken(:\n    pass\n";
    let err = check_syntax(source, FileType::Python).unwrap_err();
    assert_eq!(err.language, "python");
    assert_eq!(err.line, 2);
    assert!(err.to_string().starts_with("python syntax error at line 2"));
}

#[test]
fn test_check_syntax_other_languages() {
    assert!(check_syntax("fn main() { let x = 1; }", FileType::Rust).is_ok());
    assert!(check_syntax("fn main() { let x = ; }", FileType::Rust).is_err());
    // No grammar, nothing to check
    assert!(check_syntax("{{{ not code", FileType::Generic).is_ok());
}

// ── Chunker ─────────────────────────────────────────────────

const SMALL_MODULE: &str = r#"import os

CONST = 1

def main():
    return CONST

if __name__ == "__main__":
    main()
"#;

#[test]
fn test_chunk_declarations_and_toplevel_runs() {
    let chunks = Chunker::new(300).chunk(SMALL_MODULE, FileType::Python);
    let names: Vec<&str> = chunks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["toplevel_2", "main", "toplevel_7"]);

    for chunk in &chunks {
        assert_eq!(chunk.kind, ChunkKind::Declaration);
        assert_eq!(chunk.context, "import os");
    }
    assert_eq!(chunks[1].content, "def main():\n    return CONST");
    assert_eq!((chunks[1].start_line, chunks[1].end_line), (4, 6));
}

#[test]
fn test_chunk_layout() {
    let chunks = Chunker::new(300).chunk(SMALL_MODULE, FileType::Python);
    let layout: Vec<String> = chunks
        .iter()
        .map(|c| format!("{:?} {} {}..{}", c.kind, c.name, c.start_line, c.end_line))
        .collect();
    insta::assert_snapshot!(layout.join("\n"), @r"
    Declaration toplevel_2 2..3
    Declaration main 4..6
    Declaration toplevel_7 7..9
    ");
}

#[test]
fn test_reassemble_preserves_declarations() {
    let chunker = Chunker::new(300);
    let chunks = chunker.chunk(SMALL_MODULE, FileType::Python);
    let outputs: Vec<String> = chunks.iter().map(|c| c.with_context()).collect();

    let rebuilt = chunker.reassemble(&outputs, &chunks[0].context);
    assert_eq!(rebuilt, SMALL_MODULE);
    assert_eq!(rebuilt.matches("import os").count(), 1);
    assert!(check_syntax(&rebuilt, FileType::Python).is_ok());
}

#[test]
fn test_file_head_stays_on_top() {
    let source = "# -*- coding: latin-1 -*-\n\"\"\"Module doc.\"\"\"\n\nimport os\n\n\ndef f():\n    return os.sep\n";
    let chunker = Chunker::new(300);
    let chunks = chunker.chunk(source, FileType::Python);

    let names: Vec<&str> = chunks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["f"]);
    assert_eq!(chunks[0].context, "# -*- coding: latin-1 -*-\n\"\"\"Module doc.\"\"\"\n\nimport os");

    let outputs: Vec<String> = chunks.iter().map(|c| c.with_context()).collect();
    let rebuilt = chunker.reassemble(&outputs, &chunks[0].context);
    assert_eq!(
        rebuilt,
        "# -*- coding: latin-1 -*-\n\"\"\"Module doc.\"\"\"\n\nimport os\n\ndef f():\n    return os.sep\n"
    );
    assert!(check_syntax(&rebuilt, FileType::Python).is_ok());
}

#[test]
fn test_docstring_without_imports_is_the_context() {
    let source = "\"\"\"Helpers.\"\"\"\n\nX = 1\n\ndef g():\n    return X\n";
    let chunks = Chunker::new(300).chunk(source, FileType::Python);
    let names: Vec<&str> = chunks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["toplevel_2", "g"]);
    assert!(chunks.iter().all(|c| c.context == "\"\"\"Helpers.\"\"\""));
}

#[test]
fn test_decorated_definitions_keep_their_name() {
    let source = "from dataclasses import dataclass\n\n@dataclass\nclass Point:\n    x: int\n";
    let chunks = Chunker::default().chunk(source, FileType::Python);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].name, "Point");
    assert!(chunks[0].content.starts_with("@dataclass\n"));
}

#[test]
fn test_oversized_declaration_split_into_partials() {
    let mut lines = vec!["import os".to_string(), "import numpy as np".to_string(), String::new()];
    lines.push("def big():".to_string());
    for i in 0..399 {
        lines.push(format!("    x_{} = np.float_({})", i, i));
    }
    let mut n = 0;
    while lines.len() < 1000 {
        lines.push(String::new());
        lines.push(format!("def small_{}():", n));
        lines.push(format!("    return {}", n));
        n += 1;
    }
    let source = lines.join("\n");

    let chunks = Chunker::new(300).chunk(&source, FileType::Python);
    let partials: Vec<_> = chunks.iter().filter(|c| c.kind == ChunkKind::Partial).collect();
    assert_eq!(partials.len(), 2);
    assert_eq!(partials[0].name, "partial_3");
    assert_eq!(partials[0].line_count(), 300);
    assert_eq!(partials[1].line_count(), 100);

    let whole: Vec<_> = chunks.iter().filter(|c| c.kind == ChunkKind::Declaration).collect();
    assert_eq!(whole.len(), n);
    assert_eq!(chunks.len(), n + 2);
    assert!(chunks.iter().all(|c| c.line_count() <= 300));
    assert!(chunks.iter().all(|c| c.context == "import os\nimport numpy as np"));

    // Chunks come in source order and never overlap
    for pair in chunks.windows(2) {
        assert!(pair[0].end_line <= pair[1].start_line);
    }
}

#[test]
fn test_unparseable_source_falls_back_to_line_ranges() {
    let source: String = (0..25).map(|i| format!("def f{}(:\n", i)).collect();
    let chunks = Chunker::new(10).chunk(&source, FileType::Python);

    assert!(chunks.iter().all(|c| c.kind == ChunkKind::LineRange));
    assert!(chunks.iter().all(|c| c.context.is_empty()));
    let names: Vec<&str> = chunks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["lines_0_10", "lines_10_20", "lines_20_26"]);
}

#[test]
fn test_no_declarations_gives_whole_file() {
    let source = "import sys\nprint(sys.argv)\n";
    let chunks = Chunker::new(300).chunk(source, FileType::Python);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].kind, ChunkKind::WholeFile);
    assert_eq!(chunks[0].content, source);
    assert!(chunks[0].context.is_empty());
}

#[test]
fn test_generic_files_chunk_by_lines() {
    let source = "a\nb\nc\n";
    let chunks = Chunker::new(2).chunk(source, FileType::Generic);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].content, "a\nb");
    assert_eq!(chunks[1].content, "c\n");
}

#[test]
fn test_strip_context() {
    assert_eq!(
        strip_context("import os\n\ndef f():\n    pass\n", "import os"),
        "def f():\n    pass"
    );

    // Imports reordered by the transformer are still recognised
    let context = "import os\nimport numpy as np";
    let output = "import numpy as np\nimport os\n\ndef f():\n    pass";
    assert_eq!(strip_context(output, context), "def f():\n    pass");

    // Indentation of partial bodies survives
    assert_eq!(strip_context("import os\n\n    x = 1\n", "import os"), "    x = 1");
    assert_eq!(strip_context("\n\n    y = 2", ""), "    y = 2");
}

#[test]
fn test_strip_context_only_at_the_top() {
    // A body that repeats the context further down keeps it
    let body = "def f():\n    import os\n    return os.sep";
    assert_eq!(strip_context(body, "import os"), body);

    // A longer import that merely starts with the context is not the context
    assert_eq!(
        strip_context("import os.path\n\ndef f():\n    pass", "import os"),
        "import os.path\n\ndef f():\n    pass"
    );

    assert_eq!(strip_context("\n\nimport os\ndef f():\n    pass\n", "import os"), "def f():\n    pass");
}

// ── Cross references ────────────────────────────────────────

#[test]
fn test_python_references() {
    let items = vec![
        py("pkg/__init__.py", "from .util import scale\n"),
        py("pkg/util.py", "import numpy as np\nfrom pkg import util\n"),
        py("pkg/model.py", "from pkg.util import scale\nfrom . import helpers\n"),
        py("pkg/helpers.py", "import pkg.util as u\n"),
        py("pkg/sub/deep.py", "from ..util import scale\nfrom ... import nothing\n"),
        py(
            "main.py",
            "from pkg.model import Model\nimport pkg\n\ndef run():\n    import pkg.helpers\n",
        ),
    ];

    let pairs = PythonReferences.extract(&items);
    let expected: Vec<(ItemId, ItemId)> = [
        ("main.py", "pkg/__init__.py"),
        ("main.py", "pkg/helpers.py"),
        ("main.py", "pkg/model.py"),
        ("pkg/__init__.py", "pkg/util.py"),
        ("pkg/helpers.py", "pkg/util.py"),
        ("pkg/model.py", "pkg/helpers.py"),
        ("pkg/model.py", "pkg/util.py"),
        ("pkg/sub/deep.py", "pkg/util.py"),
    ]
    .into_iter()
    .map(|(a, b)| (ItemId::from(a), ItemId::from(b)))
    .collect();
    assert_eq!(pairs, expected);
}

#[test]
fn test_references_skip_unreadable_and_foreign_items() {
    let items = vec![
        WorkItem::missing("gone.py", "/repo/gone.py"),
        py("notes.txt", "import main"),
        py("main.py", "import gone\n"),
    ];
    let pairs = PythonReferences.extract(&items);
    assert_eq!(pairs, vec![(ItemId::from("main.py"), ItemId::from("gone.py"))]);
}

#[test]
fn test_module_names() {
    use crate::languages::python::module_name;
    assert_eq!(module_name("pkg/sub/mod.py"), "pkg.sub.mod");
    assert_eq!(module_name("pkg/__init__.py"), "pkg");
    assert_eq!(module_name("top.py"), "top");
}

// ── Discovery ───────────────────────────────────────────────

#[test]
fn test_discover_sources() {
    let temp = tempfile::Builder::new().prefix("upcast").tempdir().unwrap();
    let root = temp.path();
    for path in [
        "a.py",
        "pkg/b.py",
        "__pycache__/c.py",
        "._d.py",
        ".upcast/e.py",
        "notes.txt",
        "skip/f.py",
    ] {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, "x = 1\n").unwrap();
    }

    let found = discover_sources(root, &["**/*.py".to_string()], &["skip/**".to_string()]).unwrap();
    let relative: Vec<PathBuf> = found
        .iter()
        .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
        .collect();
    assert_eq!(relative, vec![PathBuf::from("a.py"), PathBuf::from("pkg/b.py")]);
}

#[test]
fn test_discover_rejects_bad_input() {
    let temp = tempfile::Builder::new().prefix("upcast").tempdir().unwrap();
    assert!(matches!(
        discover_sources(temp.path(), &["[".to_string()], &[]),
        Err(DiscoveryError::Pattern { .. })
    ));
    assert!(matches!(
        discover_sources(&temp.path().join("missing"), &["*.py".to_string()], &[]),
        Err(DiscoveryError::NotADirectory(_))
    ));
}
