//! Gateway API support (v1)
//!
//! - GatewayClass: shared informer and lister

pub mod gateway_class;
pub mod lister;
