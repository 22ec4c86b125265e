//! Ember Parser: a hand-written recursive-descent front end that turns an
//! already-lexed token stream into an AST plus a per-node lexical scope
//! structure.
//!
//! # Modules
//!
//! - `token` / `token_view`: the external token type (C1) and the bounded
//!   view over it that every parser routine reads through.
//! - `scope`: the per-scope symbol table with shadow classification (C2).
//! - `ast`: every AST node kind the parser can produce (§3).
//! - `expr_parser`: inline-expression parsing, greedy and non-greedy (C4).
//! - `stmt_parser`: statement parsing across all four statement modes (C5).
//! - `recovery`: the two resynchronization heuristics (C6).
//! - `transform`: the generic AST visitor (C7) and parent-pointer wiring.
//! - `project`: the compile-project interface (§6) tying the above
//!   together for one translation unit.

pub mod ast;
pub mod expr_parser;
pub mod project;
pub mod recovery;
pub mod scope;
pub mod stmt_parser;
pub mod token;
pub mod token_view;
pub mod transform;

pub use project::{ParseUnitResult, SimpleProject};
pub use scope::{DeclKind, QueryFlags, ScopeFailure, ScopeId, ScopeTable, WarningConfig};
pub use stmt_parser::StatementMode;
pub use token::{Token, TokenKind, TokenPayload};
pub use token_view::TokenView;
