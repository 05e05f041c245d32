/// Registers FFmpeg components (formats, devices, filters). Call once at
/// startup before opening inputs; repeated calls are harmless.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

pub mod decoder;
pub mod encoder;
pub mod filter;
pub mod frame;
pub mod input;
pub mod metadata;
pub mod packet;
pub mod scaler;
pub mod stream;

pub use ffmpeg_next::format::Pixel;
pub use ffmpeg_next::Rational;
