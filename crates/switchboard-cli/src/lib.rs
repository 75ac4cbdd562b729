//! Switchboard CLI library.
//!
//! The binary in `main.rs` is a thin clap front end over these commands;
//! exposing them here lets the integration tests drive the same code paths.

pub mod commands;
