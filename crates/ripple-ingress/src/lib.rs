#![warn(
    rust_2018_idioms,
    nonstandard_style,
    future_incompatible,
    clippy::mod_module_files,
    clippy::print_stdout,
    clippy::print_stderr
)]

//! Ingress of events into a query.
//!
//! Events may arrive out of order. Ingress buffers them for the reorder
//! latency, applies the disorder policy to events that arrive too late,
//! generates punctuations and low watermarks, and packs the result into
//! [DataBatch](ripple_batch::DataBatch)es according to the flush policy.

mod error;
mod ingress;
mod lane;
mod policies;

pub use error::*;
pub use ingress::*;
pub use policies::*;
