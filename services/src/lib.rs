//! Small shared helpers used across the workspace crates.

pub mod uuid;
