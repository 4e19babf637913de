//! SQL helpers shared by the services.

pub mod classifier;
pub mod sql_validator;

pub use classifier::classify;
pub use sql_validator::SqlValidator;
