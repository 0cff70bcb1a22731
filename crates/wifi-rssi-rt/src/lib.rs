//! ---
//! section: "01-core-functionality"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Runtime helpers supporting the service."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
//! Deferred execution and timing helpers for the RSSI service.

pub mod scheduling;
pub mod tasklet;

pub use scheduling::RateLimiter;
pub use tasklet::{DeferredWork, Tasklet, TaskletHandle, TaskletSchedule, TaskletStats};
