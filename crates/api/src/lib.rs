//! HTTP API: the cron-triggered processing endpoint and health check.

pub mod app;
pub mod middleware;
