use thiserror::Error;

/// Errors surfaced by stream setup and by the media capabilities.
///
/// The `*Open`, `NoVideoStream` and `RegionBounds` variants are only ever
/// returned synchronously from `add_stream`; the rest are produced inside the
/// worker loop, where they are logged and the frame is skipped.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to open source {url}: {reason}")]
    SourceOpen { url: String, reason: String },

    #[error("no video stream in {url}")]
    NoVideoStream { url: String },

    #[error(
        "region {x},{y} {w}x{h} outside source {source_width}x{source_height}"
    )]
    RegionBounds {
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        source_width: u32,
        source_height: u32,
    },

    #[error("failed to open decoder: {0}")]
    DecoderOpen(String),

    #[error("failed to open encoder at {width}x{height}: {reason}")]
    EncoderOpen {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("failed to build transform: {0}")]
    TransformBuild(String),

    #[error("source error: {0}")]
    Source(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("failed to spawn worker thread")]
    WorkerSpawn(#[source] std::io::Error),
}
