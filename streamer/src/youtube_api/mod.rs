//! YouTube Data API v3 client for live broadcasting.
//!
//! # Broadcasts vs streams
//!
//! - [`broadcasts::LiveBroadcast`] is what viewers see: title, schedule, privacy, lifecycle
//!   (`created → ready → live → complete`).
//! - [`streams::LiveStream`] is where the encoder pushes media: ingestion address, stream
//!   name, resolution.
//!
//! Going live takes both: insert a broadcast, insert a stream, bind them, push media to the
//! stream's ingestion address, then transition the broadcast to `live` and finally to
//! `complete`.

pub mod broadcasts;
pub mod client;
pub mod streams;
pub mod types;

pub use broadcasts::{BroadcastLifeCycleStatus, BroadcastStatus, LiveBroadcast, PrivacyStatus};
pub use client::{TimeBoundAccessToken, YouTubeClient};
pub use streams::{IngestionInfo, LiveStream};
pub use types::{PageInfo, PagedStream};
