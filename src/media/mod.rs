//! Per-stream pipeline: one worker thread per source.
//!
//! Data Flow:
//! ```text
//!  MediaSource ──packet──► FrameDecoder ──frame──► PlaybackClock (pace: deliver / sleep / drop)
//!       ▲                                                   │
//!       │ seek_to_start on end of stream                    ▼
//!       │                                  FrameTransform (crop + scale, rebuilt on region change)
//!       │                                                   │
//!       │                                                   ▼
//!       └──────────── loop ◄──────────────────────── FrameEncoder ──► FrameExchange ──► next_frame()
//!                                                                    (single slot, producer blocks)
//! ```
//!
//! The worker parks on a condition at every wait (pause, unconsumed frame,
//! static idle, pacing slices) and each of those conditions is woken when a
//! stop is requested.

#[cfg(feature = "ffmpeg")]
pub mod backend;
pub mod capability;
pub mod clock;
pub mod exchange;
pub mod pipe;
pub mod sleep;
pub mod types;

#[cfg(test)]
pub(crate) mod synthetic;
