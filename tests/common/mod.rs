//! Shared test utilities for logbook integration harnesses.
//!
//! Import everything you need via `mod common; use common::*;` at the top of
//! each harness file. Journal folders and databases live in `tempfile`
//! directories, so harnesses never touch the real game folder.

pub mod assertions;
pub mod builders;
pub mod fixtures;

pub use assertions::*;
pub use builders::*;
pub use fixtures::*;
