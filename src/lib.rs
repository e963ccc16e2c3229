//! This module contains the core logic of the res-menu multi-tenant gateway.
//!
//! One shared menu handler serves every restaurant; the tenant resolver
//! inspects each inbound request's host, path and query string and rewrites
//! the request so downstream handling receives a normalized
//! `(subdomain, path)` pair regardless of which physical URL form the
//! client used.

pub mod config;
pub mod metrics;
pub mod proxy;
pub mod service;
pub mod tenant;
pub mod utils;
