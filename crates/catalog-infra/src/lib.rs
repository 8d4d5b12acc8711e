//! Catalog Infrastructure Library
//!
//! Shared infrastructure for the catalog services:
//! - Telemetry initialization
//! - Upload lifecycle broadcasting (in-process topic or HTTP relay)

pub mod broadcast;
pub mod telemetry;

pub use broadcast::{
    create_broadcaster, BroadcastError, Broadcaster, HttpBroadcaster, HttpBroadcasterConfig,
    TopicBroadcaster, UploadNotifier,
};
pub use telemetry::init_telemetry;
