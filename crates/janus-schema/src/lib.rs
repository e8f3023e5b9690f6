//! # Janus Schema
//!
//! The schema constraint engine: compiles a JSON Schema (function-calling
//! spec) into a character-level acceptance automaton used to keep generated
//! output schema-valid.
//!
//! An automaton is compiled once per distinct schema and cached by
//! structural hash; it is read-only after construction and safe to share
//! across concurrent sessions. A session holds only a current-state index,
//! never a private copy of the automaton.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod automaton;
mod cache;
mod compile;

pub use automaton::{ConstraintAutomaton, StateId, Step};
pub use cache::{structural_hash, SchemaCache};
pub use compile::compile;
