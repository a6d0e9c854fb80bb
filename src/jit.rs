//! Compilation: the per-target walk, the function cache and the builders
//! that return callable handles.
pub mod builders;
pub mod cache;
pub mod op;
