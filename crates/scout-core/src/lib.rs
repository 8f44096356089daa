//! Core domain + orchestration logic for the channel discovery runner.
//!
//! This crate is framework-agnostic. The platform session client and the result
//! destinations live behind ports (traits); adapter crates implement them.

pub mod accounts;
pub mod backoff;
pub mod config;
pub mod deep_search;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod orchestrator;
pub mod ports;
pub mod proxy;
pub mod queries;
pub mod report;
pub mod sink;

pub use errors::{ClientError, Error, ErrorClass, Result};
