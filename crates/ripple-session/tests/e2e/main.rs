#![warn(
    rust_2018_idioms,
    nonstandard_style,
    future_incompatible,
    clippy::mod_module_files,
    clippy::print_stdout,
    clippy::print_stderr
)]

mod fixture;
pub(crate) use fixture::*;

mod checkpoint_tests;
mod clip_tests;
mod egress_tests;
mod eviction_tests;
mod ingress_tests;
mod join_tests;
mod union_tests;
mod where_not_exists_tests;
