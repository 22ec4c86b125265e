//! Ember Core: the shared foundation for the Ember parser and runtime.
//!
//! Neither the front end nor the runtime depend on each other, but both
//! depend on a handful of small primitives: a bump-style pool allocator for
//! AST nodes, an interner for attribute names, a diagnostic message record,
//! and a result type that keeps out-of-memory distinct from an ordinary
//! failure.
//!
//! # Modules
//!
//! - `arena`: index-addressed pool allocator with tombstone-only removal
//! - `interner`: bump-allocated attribute-name interning
//! - `message`: diagnostic severity/message records
//! - `outcome`: `Outcome<T>`, the OOM-aware result type

pub mod arena;
pub mod interner;
pub mod message;
pub mod outcome;

pub use arena::{Arena, NodeId};
pub use interner::AttributeInterner;
pub use message::{Message, MessageSink, Severity};
pub use outcome::Outcome;
