//! Keel query engine: combinator AST, shortcut registry and evaluator.
//!
//! Trees are built with the functions in [`ast`], may reference named
//! templates held by a [`ShortcutRegistry`], and are evaluated against any
//! [`keel_registry::RegistryQueryExecutor`] by an [`Evaluator`].

#![forbid(unsafe_code)]

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod library;
pub mod shortcut;

pub use ast::QueryNode;
pub use error::{QueryError, QueryResult};
pub use evaluator::Evaluator;
pub use shortcut::{ShortcutDefinition, ShortcutRegistry};
