//! Library crate for port-scan-rs exposing the probe engine and its collaborators.
pub mod banner;
pub mod config;
pub mod error;
pub mod probe;
pub mod progress;
pub mod resolve;
pub mod scanner;
pub mod services;
pub mod types;
