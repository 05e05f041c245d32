//! Media file metadata (similar to ffprobe), plus the compact summary a UI
//! needs before it picks a region: kind, duration, size and aspect ratios.

use std::fmt;

use serde::Serialize;

use crate::{input::AvInput, stream::AvStream};

/// Format-level info (corresponds to ffprobe format).
#[derive(Debug, Clone, Serialize)]
pub struct FormatInfo {
    /// Format name, e.g. "mov,mp4,m4a,3gp,3g2,mj2"
    pub format_name: String,
    /// Duration in seconds; None if unknown (e.g. a single image).
    pub duration_sec: Option<f64>,
    /// Total bitrate in bps; 0 if unknown.
    pub bit_rate: i64,
    pub nb_streams: u32,
}

/// Per-stream info (corresponds to ffprobe stream).
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    pub index: usize,
    /// Type: "video" | "audio" | "subtitle" etc.
    pub codec_type: String,
    /// Codec name, e.g. "h264", "mjpeg"
    pub codec_name: String,
    /// Time base, e.g. "1/90000"
    pub time_base: String,
    /// Stream duration in time_base units; None if unknown.
    pub duration_ts: Option<i64>,
    /// Average frame rate, e.g. "25/1"
    pub rate: String,
    /// Frame count from the container; 0 when unknown.
    pub frames: i64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Full probe result (format + streams, like ffprobe).
#[derive(Debug, Clone, Serialize)]
pub struct MediaInfo {
    pub format: FormatInfo,
    pub streams: Vec<StreamInfo>,
}

impl fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[FORMAT]")?;
        writeln!(f, "format_name={}", self.format.format_name)?;
        if let Some(d) = self.format.duration_sec {
            writeln!(f, "duration_sec={:.3}", d)?;
        } else {
            writeln!(f, "duration_sec=N/A")?;
        }
        writeln!(f, "bit_rate={}", self.format.bit_rate)?;
        writeln!(f, "nb_streams={}", self.format.nb_streams)?;
        writeln!(f, "[/FORMAT]")?;
        for s in &self.streams {
            writeln!(f, "[STREAM]")?;
            writeln!(f, "index={}", s.index)?;
            writeln!(f, "codec_type={}", s.codec_type)?;
            writeln!(f, "codec_name={}", s.codec_name)?;
            writeln!(f, "time_base={}", s.time_base)?;
            if let Some(d) = s.duration_ts {
                writeln!(f, "duration_ts={}", d)?;
            }
            writeln!(f, "rate={}", s.rate)?;
            writeln!(f, "nb_frames={}", s.frames)?;
            if let Some(w) = s.width {
                writeln!(f, "width={}", w)?;
            }
            if let Some(h) = s.height {
                writeln!(f, "height={}", h)?;
            }
            writeln!(f, "[/STREAM]")?;
        }
        Ok(())
    }
}

/// Opens a file and returns media metadata (similar to ffprobe).
///
/// # Example
///
/// ```ignore
/// use ffmpeg_roi::metadata::probe;
/// let info = probe("input.mp4")?;
/// println!("{}", info);
/// ```
pub fn probe(path: &str) -> anyhow::Result<MediaInfo> {
    let input = ffmpeg_next::format::input(path)?;

    let format_name = input.format().name().to_string();
    let nb_streams = input.nb_streams();
    let bit_rate = input.bit_rate();
    // AV_TIME_BASE = 1_000_000; duration is in 1/AV_TIME_BASE seconds
    let duration_sec = {
        let d = input.duration();
        if d == ffmpeg_next::ffi::AV_NOPTS_VALUE as i64 || d <= 0 {
            None
        } else {
            Some(d as f64 / 1_000_000.0)
        }
    };

    let mut streams = Vec::with_capacity(nb_streams as usize);
    for i in 0..nb_streams as usize {
        let stream = input
            .stream(i)
            .ok_or_else(|| anyhow::anyhow!("stream {} not found", i))?;
        let duration_ts = {
            let d = stream.duration();
            if d == ffmpeg_next::ffi::AV_NOPTS_VALUE as i64 || d < 0 {
                None
            } else {
                Some(d)
            }
        };
        let av_stream = AvStream::from(stream);
        let params = av_stream.parameters();
        let time_base = av_stream.time_base();
        let rate = av_stream.rate();
        let (width, height) = if av_stream.is_video() {
            (Some(av_stream.width()), Some(av_stream.height()))
        } else {
            (None, None)
        };

        streams.push(StreamInfo {
            index: av_stream.index(),
            codec_type: format!("{:?}", params.medium()).to_lowercase(),
            codec_name: format!("{:?}", params.id()).to_lowercase(),
            time_base: format!("{}/{}", time_base.numerator(), time_base.denominator()),
            duration_ts,
            rate: format!("{}/{}", rate.numerator(), rate.denominator()),
            frames: av_stream.frames(),
            width,
            height,
        });
    }

    Ok(MediaInfo {
        format: FormatInfo {
            format_name,
            duration_sec,
            bit_rate,
            nb_streams,
        },
        streams,
    })
}

/// Coarse media class derived from the demuxer name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Img,
    Gif,
    Video,
}

impl MediaKind {
    pub fn from_format_name(format_name: &str) -> Self {
        if format_name.contains("image2")
            || format_name.contains("png")
            || format_name.ends_with("_pipe")
        {
            MediaKind::Img
        } else if format_name.contains("gif") {
            MediaKind::Gif
        } else {
            MediaKind::Video
        }
    }
}

/// What a client needs to lay out a source: kind, duration and geometry.
/// `valid` is false when no video stream was found; the geometry fields are
/// zero/default in that case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaSummary {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// Seconds; 0.0 when unknown.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Sample aspect ratio as "num:den".
    pub sar: String,
    /// Display aspect ratio as "num:den".
    pub dar: String,
    pub valid: bool,
}

impl Default for MediaSummary {
    fn default() -> Self {
        Self {
            kind: MediaKind::Video,
            duration: 0.0,
            width: 0,
            height: 0,
            sar: "1:1".to_string(),
            dar: "0:0".to_string(),
            valid: false,
        }
    }
}

/// Opens `path` and summarizes its first video stream. An unopenable file is
/// an error; a file without video yields a summary with `valid == false`.
pub fn summarize(path: &str) -> anyhow::Result<MediaSummary> {
    let input = AvInput::new(path, None, None)?;
    let mut summary = MediaSummary {
        kind: MediaKind::from_format_name(&input.format_name()),
        duration: input.duration_ms().map(|ms| ms as f64 / 1000.0).unwrap_or(0.0),
        ..Default::default()
    };

    let mut video: Vec<&AvStream> = input.streams().values().filter(|s| s.is_video()).collect();
    video.sort_by_key(|s| s.index());
    if let Some(stream) = video.first() {
        let sar = stream.sample_aspect_ratio();
        let (sar_num, sar_den) = normalize_sar(sar.numerator(), sar.denominator());
        let (dar_num, dar_den) = display_aspect(stream.width(), stream.height(), sar_num, sar_den);
        summary.width = stream.width();
        summary.height = stream.height();
        summary.sar = format!("{}:{}", sar_num, sar_den);
        summary.dar = format!("{}:{}", dar_num, dar_den);
        summary.valid = true;
    }
    Ok(summary)
}

/// An unset (0 or negative) sample aspect ratio means square pixels.
pub fn normalize_sar(num: i32, den: i32) -> (u32, u32) {
    if num <= 0 || den <= 0 {
        (1, 1)
    } else {
        (num as u32, den as u32)
    }
}

/// Reduced `width*sar_num : height*sar_den`; `(0, 0)` for an empty picture.
pub fn display_aspect(width: u32, height: u32, sar_num: u32, sar_den: u32) -> (u64, u64) {
    let num = width as u64 * sar_num as u64;
    let den = height as u64 * sar_den as u64;
    if num == 0 || den == 0 {
        return (0, 0);
    }
    let g = gcd(num, den);
    (num / g, den / g)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
