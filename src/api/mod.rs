//! REST API Server Module
//!
//! This module provides the REST API for the transfer verifier service:
//! submitting transactions for an immediate check and reading pending records.

// Generic shared code
mod generic;

// Check submission and lookup endpoints
mod check;

pub use check::{CheckBody, CheckResponse};
pub use generic::{ApiResponse, ApiServer};
