#![warn(
    rust_2018_idioms,
    nonstandard_style,
    future_incompatible,
    clippy::mod_module_files,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::undocumented_unsafe_blocks
)]

//! Arrow helpers shared by the ripple crates.
//!
//! [scalar_value::ScalarValue] is the boxed form of a single payload, used
//! by row-based execution and inside checkpoints.

pub mod scalar_value;
pub mod serde;
pub mod utils;
