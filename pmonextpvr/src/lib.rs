//! # pmonextpvr - NextPVR client for PMOMusic
//!
//! This crate talks to a NextPVR server over its JSON web service and exposes
//! the server's recordings as a browsable catalog.
//!
//! ## Overview
//!
//! - Session handshake with the configured PIN, renewed transparently
//! - Channels, guide, recordings, timers and recurring rules
//! - In-memory snapshot of the recordings, grouped into series and category
//!   folders
//! - Change polling that invalidates the snapshot when the server reports a
//!   change
//!
//! ## Architecture
//!
//! ```text
//! pmonextpvr/
//! ├── src/
//! │   ├── lib.rs              # This file
//! │   ├── client.rs           # NextPvrClient, change marker, streams
//! │   ├── models.rs           # Domain types
//! │   ├── api/
//! │   │   ├── mod.rs          # HTTP transport and envelope handling
//! │   │   ├── session.rs      # Handshake and session freshness
//! │   │   ├── signing.rs      # Login digest
//! │   │   ├── settings.rs     # Backend defaults and status
//! │   │   ├── channels.rs     # Channels and guide
//! │   │   ├── recordings.rs   # Recordings and timers
//! │   │   └── recurring.rs    # Recurring rules
//! │   ├── catalog.rs          # Consumer items and folders
//! │   ├── cache.rs            # Recording snapshot
//! │   ├── poller.rs           # Change poller
//! │   ├── source.rs           # RecordingSource trait
//! │   ├── stream.rs           # Stream descriptors
//! │   ├── config_ext.rs       # pmoconfig extension
//! │   └── error.rs            # Error types
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pmonextpvr::{NextPvrClient, RecordingCache};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Reads sources.nextpvr from pmoconfig
//!     let client = Arc::new(NextPvrClient::from_config()?);
//!     let cache = RecordingCache::new(client.clone());
//!     let cancel = CancellationToken::new();
//!
//!     for folder in cache.get_groups(&cancel).await? {
//!         println!("{} ({} items)", folder.name, folder.item_count);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```yaml
//! sources:
//!   nextpvr:
//!     web_service_url: http://localhost:8866
//!     pin: "0000"
//!     recording_default: "2"
//!     poll_interval_secs: 20
//! ```

pub mod api;
pub mod cache;
pub mod catalog;
pub mod client;
pub mod config_ext;
pub mod error;
pub mod models;
pub mod poller;
pub mod source;
pub mod stream;

pub use cache::RecordingCache;
pub use catalog::{ContentType, MediaType, RecordingFolder, RecordingItem};
pub use client::{ClientBuilder, NextPvrClient};
pub use config_ext::{NextPvrConfigExt, NextPvrSettings};
pub use error::{NextPvrError, Result};
pub use models::{
    BackendDefaults, ChangeMarker, Channel, ChannelType, Program, Recording, RecordingStatus,
    SeriesTimer, ServerStatus, Timer, TunerInfo,
};
pub use poller::{ChangePoller, ChangeSource, ChangeTracker, ContentChanged, PollOutcome};
pub use source::RecordingSource;
pub use stream::{StreamDescriptor, StreamProtocol};
