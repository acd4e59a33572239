//! Prometheus exporter for Jellyfin.
//!
//! Polls the Jellyfin API on a fixed interval, classifies sessions into
//! streaming / connected / disconnected, and republishes per-user session
//! counts and library counts as gauges.

pub mod activity;
pub mod agent;
pub mod aggregate;
pub mod clock;
pub mod config;
pub mod export;
pub mod jellyfin;
pub mod refresh;
