//! `OpenQASM` 3.1 snippet parser and emitter for the leqo compile core.
//!
//! This crate handles the textual side of the pipeline: node snippets come
//! in as `OpenQASM` 3 source, are parsed into a statement-preserving AST,
//! rewritten by the compile stages, and serialized back to canonical text.
//!
//! # Supported Features
//!
//! | Feature | Example |
//! |---------|---------|
//! | Version declaration | `OPENQASM 3.1;` |
//! | Qubit declarations | `qubit[5] q;` |
//! | Classical declarations | `bit[5] c;`, `int[32] n = 4;` |
//! | Alias statements | `let r = q[0:1] ++ anc;` |
//! | Gate calls & definitions | `rx(pi/4) q[0];`, `gate bell a, b { … }` |
//! | Measurements | `bit[2] c = measure q;`, `measure q -> c;` |
//! | Branching | `if (flag == 1) { … } else { … }` |
//! | leqo annotations | `@leqo.input 0`, `@leqo.output 1`, `@leqo.reusable` |
//!
//! # Example
//!
//! ```rust
//! use leqo_qasm3::{parse, emit};
//!
//! let snippet = r#"
//!     @leqo.input 0
//!     qubit[2] q;
//!     h q[0];
//!     @leqo.output 0
//!     let out = q;
//! "#;
//!
//! let program = parse(snippet).unwrap();
//! assert_eq!(program.statements.len(), 3);
//!
//! let text = emit(&program);
//! assert!(text.contains("@leqo.input 0"));
//! ```
//!
//! The `@leqo.*` annotations bind snippet-local declarations to the ports of
//! the surrounding program graph; see [`ast::Annotation`]. Annotations are a
//! sidecar on [`ast::Statement`], not dedicated node types, so rewriting
//! stages can match on statement kinds without a polymorphism explosion.

pub mod ast;
mod emitter;
mod error;
mod lexer;
mod parser;

pub use emitter::emit;
pub use error::{ParseError, ParseResult};
pub use parser::{parse, parse_expression};
