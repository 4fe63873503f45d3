//! Integration tests for flowkit.
//!
//! Projects live in memory and the access node is an in-process emulator
//! stand-in, so these run without a network.
//!
//! Run with: `cargo test --test integration`

mod config_integration;
mod deploy_integration;
mod emulator;
mod event_integration;
mod transaction_integration;
