//! Clamor: an alarm clock that can only be silenced after the room has
//! been loud for a while.
//!
//! The daemon (`clamor-alarmd`) polls stored alarms, rings the due one,
//! and listens to the microphone until sustained noise unlocks the
//! silence action. Users manage alarms over an HTTP API, usually through
//! `clamor-cli`.

pub mod alarm;
pub mod api;
pub mod api_client;
pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod noise_gate;
pub mod ring;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod tracing;
