//! Kubernetes API integrations
//!
//! Type-specific informers and listers for the Gateway API (v1), plus the
//! metrics they record.

pub mod gateway;
pub mod metrics;
