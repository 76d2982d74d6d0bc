//! Core runtime infrastructure.
//!
//! This module contains the essential components for running a node:
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Main runtime orchestration
//! - [`time`] - Clock abstraction for expiry and broadcasts
//! - [`error`] - Error types and the external error table

pub mod config;
pub mod error;
pub mod runtime;
pub mod time;
