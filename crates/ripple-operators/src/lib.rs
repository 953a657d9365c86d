#![warn(
    rust_2018_idioms,
    nonstandard_style,
    future_incompatible,
    clippy::mod_module_files,
    clippy::print_stdout,
    clippy::print_stderr
)]

//! Incremental binary operators over event streams.
//!
//! Each operator consumes [DataBatch](ripple_batch::DataBatch)es from a left
//! and a right input and produces batches as soon as the progress of both
//! inputs (data, punctuations and low watermarks) allows the output to be
//! produced in time order. State is kept per partition for partitioned
//! streams, and partitions are evicted once the low watermark has passed
//! them and they hold no state.

mod binary;
mod equality;
mod error;
mod lane;
mod logic;
mod operator;
mod output;
mod state;
mod strategy;

pub use equality::PayloadEquality;
pub use error::Error;
pub use operator::*;
pub use strategy::ExecutionMode;
