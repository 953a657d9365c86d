#![warn(
    rust_2018_idioms,
    nonstandard_style,
    future_incompatible,
    clippy::mod_module_files,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::undocumented_unsafe_blocks
)]

//! Interface and utilities for state management.

mod checkpoint;
mod error;
mod min_heap;
mod partition_table;

pub use checkpoint::*;
pub use error::*;
pub use min_heap::*;
pub use partition_table::*;
