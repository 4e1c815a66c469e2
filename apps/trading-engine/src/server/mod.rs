//! Inbound REST surface.
//!
//! Thin layer over the settlement engine, aggregator and store: request
//! decoding, parameter normalization and error-to-status mapping only.
//! No decision logic lives here.

mod http;

pub use http::{ApiState, create_router};
