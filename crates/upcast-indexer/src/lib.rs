//! Source parsing: language tables, chunking, syntax checks and import analysis

pub mod languages;
pub mod parser;
pub mod chunker;
pub mod syntax;
pub mod references;
pub mod discovery;

#[cfg(test)]
pub mod tests;

pub use languages::FileType;
pub use chunker::{Chunker, strip_context};
pub use syntax::{SyntaxError, check_syntax};
pub use references::PythonReferences;
pub use discovery::{DiscoveryError, discover_sources};
