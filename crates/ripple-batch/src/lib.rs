#![warn(
    rust_2018_idioms,
    nonstandard_style,
    future_incompatible,
    clippy::mod_module_files,
    clippy::print_stdout,
    clippy::print_stderr
)]

//! Events and the columnar batches that carry them between stages.

mod batch;
mod builder;
mod error;
mod event;
mod io;
mod pool;
mod properties;
mod sync_time;

pub use batch::*;
pub use builder::*;
pub use error::Error;
pub use event::*;
pub use io::*;
pub use pool::*;
pub use properties::*;
pub use sync_time::*;
