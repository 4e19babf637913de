//! Shared building blocks for the SQL access gateway.
//!
//! - `config`: connection configuration, URL parsing and environment loading
//! - `errors`: the error taxonomy shared by every layer
//! - `models`: schema, table data and query result models
//! - `response`: the unified API response envelope
//! - `middleware`: request-id tracing middleware
//! - `utils`: SQL security validation and statement classification

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;
