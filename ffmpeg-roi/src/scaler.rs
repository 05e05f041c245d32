use ffmpeg_next::{
    format::Pixel,
    software::scaling::{Context, flag::Flags},
};

/// swscale context used to convert pictures into the encoder's pixel format.
pub struct Scaler {
    context: Context,
    format: Pixel,
    width: u32,
    height: u32,
}

impl Scaler {
    /// Same-size pixel format conversion.
    pub fn convert(src: Pixel, dst: Pixel, width: u32, height: u32) -> anyhow::Result<Self> {
        let context = Context::get(src, width, height, dst, width, height, Flags::BILINEAR)?;
        Ok(Self {
            context,
            format: src,
            width,
            height,
        })
    }

    /// True when this context was built for pictures of the given shape.
    pub fn accepts(&self, format: Pixel, width: u32, height: u32) -> bool {
        self.format == format && self.width == width && self.height == height
    }

    pub fn run(
        &mut self,
        frame: &ffmpeg_next::frame::Video,
        dst: &mut ffmpeg_next::frame::Video,
    ) -> anyhow::Result<()> {
        self.context.run(frame, dst).map_err(|e| e.into())
    }
}

unsafe impl Send for Scaler {}
