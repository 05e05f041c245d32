use std::collections::HashMap;
use std::ffi::CString;
use std::path::Path;

use ffmpeg_next::Dictionary;

use crate::{packet::RawPacket, stream::AvStream};

/// An opened demuxer: stream table, container facts and packet reads.
pub struct AvInput {
    inner: ffmpeg_next::format::context::Input,
    streams: HashMap<usize, AvStream>,
    best_video: Option<usize>,
}

unsafe impl Send for AvInput {}

impl AvInput {
    /// Resolve input format by name (e.g. "v4l2", "image2") via FFmpeg's av_find_input_format.
    fn find_input_format(name: &str) -> anyhow::Result<ffmpeg_next::format::format::Input> {
        let cname = CString::new(name)
            .map_err(|e| anyhow::anyhow!("invalid format name {:?}: {}", name, e))?;
        let ptr = unsafe { ffmpeg_next::ffi::av_find_input_format(cname.as_ptr()) };
        if ptr.is_null() {
            return Err(anyhow::anyhow!("input format not found: {}", name));
        }
        Ok(unsafe { ffmpeg_next::format::format::Input::wrap(ptr as *mut _) })
    }

    /// Opens `url` and reads stream info. `format` forces a demuxer, `options`
    /// are passed to `avformat_open_input`.
    pub fn new(
        url: &str,
        format: Option<&str>,
        options: Option<Dictionary>,
    ) -> anyhow::Result<Self> {
        use ffmpeg_next::format::format::Format;

        let path = Path::new(url);
        let input = match (format, options) {
            (Some(fmt_name), opts) => {
                let fmt = Self::find_input_format(fmt_name)?;
                let ctx = ffmpeg_next::format::open_with(
                    path,
                    &Format::Input(fmt),
                    opts.unwrap_or_default(),
                )?;
                ctx.input()
            }
            (None, Some(opts)) => ffmpeg_next::format::input_with_dictionary(path, opts)?,
            (None, None) => ffmpeg_next::format::input(path)?,
        };

        let mut streams = HashMap::new();
        for stream in input.streams() {
            streams.insert(stream.index(), AvStream::from(stream));
        }
        let best_video = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .map(|s| s.index());

        Ok(Self {
            inner: input,
            streams,
            best_video,
        })
    }

    pub fn streams(&self) -> &HashMap<usize, AvStream> {
        &self.streams
    }

    pub fn stream(&self, index: usize) -> Option<&AvStream> {
        self.streams.get(&index)
    }

    /// The stream `av_find_best_stream` picks for video, if any.
    pub fn best_video_stream(&self) -> Option<&AvStream> {
        self.best_video.and_then(|i| self.streams.get(&i))
    }

    /// Short demuxer name, e.g. "mov,mp4,m4a,3gp,3g2,mj2" or "image2".
    pub fn format_name(&self) -> String {
        self.inner.format().name().to_string()
    }

    /// Container duration in milliseconds; None if unknown or non-positive.
    pub fn duration_ms(&self) -> Option<i64> {
        let d = self.inner.duration();
        if d == ffmpeg_next::ffi::AV_NOPTS_VALUE as i64 || d <= 0 {
            None
        } else {
            // AV_TIME_BASE = 1_000_000
            Some(d / 1000)
        }
    }

    /// Next packet of any stream; None at end of stream.
    pub fn read_packet(&mut self) -> Option<RawPacket> {
        self.inner
            .packets()
            .next()
            .map(|(stream, packet)| (packet, stream.time_base()).into())
    }

    /// Seeks every stream back to the first packet.
    pub fn seek_to_start(&mut self) -> anyhow::Result<()> {
        self.inner
            .seek(0, i64::MIN..i64::MAX)
            .map_err(|e| anyhow::anyhow!("seek to start: {}", e))
    }
}
