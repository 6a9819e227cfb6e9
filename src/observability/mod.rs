//! Logging bootstrap for applications embedding the client.
//!
//! The client itself only emits `tracing` events; installing a subscriber is
//! left to the application, which may use [`init_tracing`] for a ready-made
//! pretty, compact or JSON console subscriber.

mod tracing_init;

pub use tracing_init::*;
