//! Boolean search query language
//!
//! Queries combine bare words, quoted phrases, `AND`/`OR`/`NOT` (any case)
//! and their symbolic forms `&`, `|` and a leading `-`, with parentheses for
//! grouping. Adjacent terms are joined by an implicit AND.
//!
//! Precedence, tightest first: NOT, AND, OR.
//!
//! # Example
//!
//! ```
//! use forum_search::query::{evaluate, parse_query};
//!
//! let ast = parse_query("(guide OR tutorial) -draft").unwrap();
//! assert!(evaluate(&ast, "A beginner Guide to lifetimes"));
//! assert!(!evaluate(&ast, "Tutorial (draft)"));
//! ```

mod ast;
mod error;
mod lexer;
mod parser;

pub use ast::QueryNode;
pub use error::{ParseError, ParseResult};

/// Parse a raw query string into an immutable boolean tree
pub fn parse_query(text: &str) -> ParseResult<QueryNode> {
    parser::parse(text)
}

/// Evaluate a parsed query against a haystack, ignoring case
pub fn evaluate(ast: &QueryNode, text: &str) -> bool {
    ast.matches(text)
}
