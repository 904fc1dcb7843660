//! HTTP layer: router, error mapping, handlers.

pub mod error;
pub mod handlers;
pub mod router;
