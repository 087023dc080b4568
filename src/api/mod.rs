//! HTTP API for the audit registry
//!
//! Provides:
//! - Registry API (auditors, audit reports, findings, contract scores)
//! - Security middleware (auth, rate limiting, headers, request logging)

pub mod middleware;
pub mod registry;

pub use middleware::{
    RateLimiter, SecurityMiddlewareConfig, SecurityState, auth_middleware, body_size_middleware,
    logging_middleware, rate_limit_middleware, security_headers_middleware,
};
pub use registry::{CALLER_HEADER, Caller, RegistryApiState, create_router as create_registry_router};
