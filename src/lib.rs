//! # bili-live-rs
//!
//! This crate watches a single Bilibili live room and records every broadcast.
//! While the room is offline it polls the room's play info on a fixed
//! interval. Once the room goes live it picks a codec and quality, resolves a
//! direct stream URL, and hands that URL to `ffmpeg`, which remuxes the stream
//! into a local file. When `ffmpeg` exits the monitor goes back to polling.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bili_live_rs::{api, ffmpeg, monitor, util};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Session shared by every API call. Transient errors are retried.
//!     let config = util::ClientConfig::default();
//!     let capture_headers = config.capture_headers();
//!     let http = util::HttpClient::new(config).unwrap();
//!
//!     let api = api::ApiClient::new(http, 744393);
//!     let config = monitor::MonitorConfig {
//!         capture_headers,
//!         ..Default::default()
//!     };
//!
//!     // Returns once ffmpeg reports that monitoring should stop
//!     let mut monitor = monitor::RoomMonitor::new(api, ffmpeg::FfmpegCapture::default(), config);
//!     monitor.run().await.unwrap();
//! }
//! ```
//!
//! The lower level pieces are usable on their own: `api::ApiClient::fetch`
//! answers whether the room is live, `selector::select` picks a codec and
//! `resolver::resolve` turns that choice into a playable URL.

#[forbid(unsafe_code)]
#[macro_use]
extern crate log;

pub mod api;
pub mod ffmpeg;
pub mod monitor;
pub mod play_info;
pub mod resolver;
pub mod selector;
pub mod stats;
pub mod util;

#[cfg(test)]
mod test_util;
