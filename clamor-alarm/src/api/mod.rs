//! HTTP API for managing alarms and silencing the ringing one.
//!
//! The API is the daemon's UI boundary: `clamor-cli` and any other
//! front end go through it. Handlers never touch alarm state directly;
//! mutations are [`commands`] sent to the alarm service, reads come from
//! its watch channels.

pub mod commands;
mod server;
mod v0;

pub use server::{SharedState, router, serve};
