pub mod api;
pub mod backfill;
pub mod calendar;
pub mod collector;
pub mod config;
pub mod coverage;
pub mod error;
pub mod models;
pub mod rate_limiter;
pub mod resolver;
pub mod sector;
pub mod sentiment;
pub mod store;
