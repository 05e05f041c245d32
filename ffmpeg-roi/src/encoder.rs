use ffmpeg_next::{Dictionary, Rational, format::Pixel};

use crate::{frame::RawVideoFrame, packet::RawPacket, scaler::Scaler};

#[derive(Debug, Clone)]
pub struct Settings {
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub pixel_format: Pixel,
    pub time_base: Rational,
}

impl Settings {
    /// MJPEG at the given size, the format every published frame uses by default.
    pub fn mjpeg(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            codec: "mjpeg".to_string(),
            pixel_format: Pixel::YUVJ420P,
            time_base: Rational::new(1, 25),
        }
    }
}

/// Single-stream video encoder. Input pictures in another pixel format are
/// converted with a lazily built [`Scaler`].
pub struct Encoder {
    inner: ffmpeg_next::codec::encoder::Video,
    settings: Settings,
    frame_index: i64,
    scaler: Option<Scaler>,
}

unsafe impl Send for Encoder {}

impl Encoder {
    pub fn new(settings: Settings, options: Option<Dictionary>) -> anyhow::Result<Self> {
        if settings.width == 0 || settings.height == 0 {
            anyhow::bail!(
                "invalid encoder size {}x{}",
                settings.width,
                settings.height
            );
        }
        let codec = ffmpeg_next::encoder::find_by_name(&settings.codec)
            .ok_or(anyhow::anyhow!("codec not found: {}", settings.codec))?;

        let mut encoder = ffmpeg_next::codec::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        encoder.set_width(settings.width);
        encoder.set_height(settings.height);
        encoder.set_format(settings.pixel_format);
        encoder.set_time_base(settings.time_base);

        let encoder = encoder.open_with(options.unwrap_or_default())?;
        log::debug!(
            "encoder opened: {} {}x{} {:?}",
            settings.codec,
            settings.width,
            settings.height,
            settings.pixel_format
        );

        Ok(Self {
            inner: encoder,
            settings,
            frame_index: 0,
            scaler: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.settings.width
    }

    pub fn height(&self) -> u32 {
        self.settings.height
    }

    pub fn send_frame(&mut self, frame: RawVideoFrame) -> anyhow::Result<()> {
        if frame.width() != self.settings.width || frame.height() != self.settings.height {
            anyhow::bail!(
                "frame size {}x{} does not match encoder size {}x{}",
                frame.width(),
                frame.height(),
                self.settings.width,
                self.settings.height
            );
        }

        let mut frame = if frame.format() != self.settings.pixel_format {
            let (format, width, height) = (frame.format(), frame.width(), frame.height());
            let rebuild = match self.scaler.as_ref() {
                Some(scaler) => !scaler.accepts(format, width, height),
                None => true,
            };
            if rebuild {
                self.scaler = Some(Scaler::convert(
                    format,
                    self.settings.pixel_format,
                    width,
                    height,
                )?);
            }

            let mut converted = ffmpeg_next::frame::Video::empty();
            if let Some(scaler) = self.scaler.as_mut() {
                scaler.run(frame.as_video(), &mut converted)?;
            }
            RawVideoFrame::from(converted)
        } else {
            frame
        };

        frame.set_pts(Some(self.frame_index));
        self.inner.send_frame(frame.as_video())?;
        self.frame_index += 1;
        Ok(())
    }

    pub fn send_eof(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()?;
        Ok(())
    }

    pub fn receive_packet(&mut self) -> anyhow::Result<Option<RawPacket>> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        match self.inner.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(RawPacket::from((packet, self.settings.time_base)))),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(None)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Sends one picture and returns the packet it produced, if the codec
    /// emitted one right away (intra-only codecs always do).
    pub fn encode(&mut self, frame: RawVideoFrame) -> anyhow::Result<Option<RawPacket>> {
        self.send_frame(frame)?;
        self.receive_packet()
    }
}
