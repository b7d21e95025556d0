//! streamscout: turns embed-page identifiers into direct HLS manifest URLs.
//!
//! A headless browser loads the embed page and the first `.m3u8` request it
//! makes is returned to the caller and cached for a while.

pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod resolver;
pub mod server;
pub mod service;
