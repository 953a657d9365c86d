#![warn(
    rust_2018_idioms,
    nonstandard_style,
    future_incompatible,
    clippy::mod_module_files,
    clippy::print_stdout,
    clippy::print_stderr
)]

//! Query containers and the processes running them.
//!
//! A [QueryContainer] registers inputs, binary operators over streams and
//! outputs. [QueryContainer::restore] turns it into a running [Process],
//! optionally resuming from a checkpoint. Events are pushed with an
//! [IngressHandle] and delivered to the subscribers of an [EgressHandle].

mod config;
mod container;
mod egress;
mod error;
mod process;
mod reshape;

pub use config::Config;
pub use container::{Input, Output, QueryContainer, Stream};
pub use egress::{EgressHandle, Subscription};
pub use error::Error;
pub use process::{IngressHandle, Process};
pub use reshape::ReshapingPolicy;
