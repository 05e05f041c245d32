//! Multi-stream region-of-interest player.
//!
//! Each registered source gets its own worker thread that decodes, paces to
//! the source clock, crops/scales the configured region, re-encodes and
//! publishes the newest frame for a single pull-based consumer. See
//! [`manager::StreamRegistry`] for the public surface.

pub mod config;
pub mod error;
pub mod manager;
pub mod media;

pub use config::{PlayerConfig, StreamOptions};
pub use error::PipelineError;
pub use manager::StreamRegistry;
pub use media::types::{EncodedFrame, RegionConfig, StreamKey};
