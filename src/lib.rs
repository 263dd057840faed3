//! Slidegate - Sliding-Window Rate Limiting
//!
//! This crate implements a sliding-window-log rate limiter with per-key
//! isolation, a layered policy of global and per-route quotas, and a small
//! HTTP gateway that applies the policy to inbound requests.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
