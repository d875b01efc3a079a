#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod author;
pub mod blocked_by;
pub mod blocklist;
pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod moderation;
pub mod session;
pub mod slice;
pub mod source;
pub mod tuner;
pub mod types;
pub mod xrpc;

#[cfg(test)]
mod fixtures;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
