#![forbid(unsafe_code)]

//! Relay chat messages to a single terminal operator and post their replies
//! back.
//!
//! Inbound messages queue up in a FIFO; one worker at a time shows the head
//! to the operator, captures a reply under an inactivity deadline that
//! resets on every keystroke, and hands it to the outbound sink, requeueing
//! at the tail when delivery fails.

pub mod capture;
pub mod config;
pub mod errors;
pub mod input;
pub mod models;
pub mod relay;
pub mod slack;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
