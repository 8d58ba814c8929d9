//! # RPGER Common Library
//!
//! Shared code for the rpger ingest services:
//! - Error taxonomy (machine codes, CLI exit codes)
//! - Session/progress event types (EventBus)
//! - Environment configuration

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
