use ffmpeg_next::Rational;

/// Decoded (or filtered) video picture owned by FFmpeg.
#[derive(Clone)]
pub struct RawVideoFrame {
    frame: ffmpeg_next::frame::Video,
}

impl From<ffmpeg_next::frame::Video> for RawVideoFrame {
    fn from(frame: ffmpeg_next::frame::Video) -> Self {
        Self { frame }
    }
}

impl RawVideoFrame {
    /// Allocates a blank picture with its own buffers.
    pub fn new(format: ffmpeg_next::format::Pixel, width: u32, height: u32) -> Self {
        Self {
            frame: ffmpeg_next::frame::Video::new(format, width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn format(&self) -> ffmpeg_next::format::Pixel {
        self.frame.format()
    }

    /// Raw `AVPixelFormat` value, as the `buffer` filter expects it.
    pub fn format_raw(&self) -> i32 {
        unsafe { (*self.frame.as_ptr()).format }
    }

    /// Raw `AVColorSpace` value.
    pub fn color_space_raw(&self) -> i32 {
        unsafe { (*self.frame.as_ptr()).colorspace as i32 }
    }

    /// Raw `AVColorRange` value.
    pub fn color_range_raw(&self) -> i32 {
        unsafe { (*self.frame.as_ptr()).color_range as i32 }
    }

    pub fn sample_aspect_ratio(&self) -> Rational {
        unsafe {
            let sar = (*self.frame.as_ptr()).sample_aspect_ratio;
            Rational::new(sar.num, sar.den)
        }
    }

    pub fn pts(&self) -> Option<i64> {
        self.frame.pts()
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        self.frame.set_pts(pts);
    }

    /// Best-effort timestamp, falling back to the raw pts.
    pub fn timestamp(&self) -> Option<i64> {
        self.frame.timestamp().or(self.frame.pts())
    }

    pub fn get_mut(&mut self) -> &mut ffmpeg_next::frame::Video {
        &mut self.frame
    }

    pub fn as_video(&self) -> &ffmpeg_next::frame::Video {
        &self.frame
    }
}
