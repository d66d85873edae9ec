//! API handlers
//!
//! Each handler extracts state and parameters, calls into the engine, the
//! order router or the price publisher, and maps the result to the shared
//! response format.

pub mod health;
pub mod market;
pub mod order;
pub mod response;

pub use response::ApiResponse;
