//! Binary-only crate split into modules so `main.rs` stays a thin entry
//! point; nothing here is meant to be consumed as a library by other crates.

pub mod config;
pub mod control;
pub mod handler;
pub mod observer;
pub mod server;
