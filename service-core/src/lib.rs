//! service-core: Shared infrastructure for the retinopathy screening services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
