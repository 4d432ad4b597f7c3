#![allow(clippy::uninlined_format_args)]

pub mod analyzer;
pub mod api;
pub mod app;
pub mod config;
pub mod context;
pub mod credentials;
pub mod logging;
pub mod page;
pub mod poll;
pub mod rate_limit;
pub mod registry;
pub mod render;
pub mod scanner;
pub mod stats;

#[cfg(test)]
pub(crate) mod test_support;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, RunOptions};
