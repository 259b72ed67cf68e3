//! varmux - parameter-multiplexing engine for test runs
//!
//! Builds a directive-aware configuration tree from one or more yaml
//! documents, merges overlapping trees by name-matched nodes, prunes the
//! result with only/exclude path filters, and lazily enumerates every
//! combination of parameters ("variants") a test run must execute: one
//! alternative drawn from each independent multiplex domain, with a
//! deterministic, hash-suffixed identifier per variant.

pub mod filter;
pub mod loader;
pub mod mux;
pub mod tree;
pub mod varianter;

pub use filter::apply_filters;
pub use loader::{load_documents, LoadError};
pub use tree::{Multiplex, NodeId, Tree};
pub use varianter::{inject_value, Varianter, VariantLeaf, VariantSpec};
