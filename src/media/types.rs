use std::fmt::{Display, Formatter};

use bytes::Bytes;

use crate::error::PipelineError;

/// Identifies one pipeline: a device id plus a per-device slot index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    pub device_id: String,
    pub index: i32,
}

impl StreamKey {
    pub fn new(device_id: impl Into<String>, index: i32) -> Self {
        Self {
            device_id: device_id.into(),
            index,
        }
    }
}

impl Display for StreamKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.device_id, self.index)
    }
}

/// Crop box in source pixels plus the fixed output size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegionConfig {
    pub src_x: u32,
    pub src_y: u32,
    pub src_w: u32,
    pub src_h: u32,
    pub out_w: u32,
    pub out_h: u32,
}

impl RegionConfig {
    pub fn new(src_x: u32, src_y: u32, src_w: u32, src_h: u32, out_w: u32, out_h: u32) -> Self {
        Self {
            src_x,
            src_y,
            src_w,
            src_h,
            out_w,
            out_h,
        }
    }

    /// Same output size, new crop box.
    pub fn with_crop(self, x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            src_x: x,
            src_y: y,
            src_w: w,
            src_h: h,
            ..self
        }
    }

    /// True when the crop box lies inside a `width`x`height` picture. An
    /// empty box fits; the transform rejects it later.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.src_x as u64 + self.src_w as u64 <= width as u64
            && self.src_y as u64 + self.src_h as u64 <= height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.src_w == 0 || self.src_h == 0
    }

    pub fn check_bounds(&self, width: u32, height: u32) -> Result<(), PipelineError> {
        if self.fits(width, height) {
            Ok(())
        } else {
            Err(PipelineError::RegionBounds {
                x: self.src_x,
                y: self.src_y,
                w: self.src_w,
                h: self.src_h,
                source_width: width,
                source_height: height,
            })
        }
    }
}

impl Display for RegionConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "crop {}x{}+{}+{} -> {}x{}",
            self.src_w, self.src_h, self.src_x, self.src_y, self.out_w, self.out_h
        )
    }
}

/// The unit handed to consumers. `Default` is the "nothing yet" value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodedFrame {
    pub payload: Bytes,
    pub width: u32,
    pub height: u32,
    /// Presentation time of the source frame in milliseconds.
    pub pts: i64,
    pub success: bool,
}

impl EncodedFrame {
    pub fn new(payload: Bytes, width: u32, height: u32, pts: i64) -> Self {
        Self {
            payload,
            width,
            height,
            pts,
            success: true,
        }
    }
}

/// Timestamp unit of a stream or frame, as a rational number of seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const MILLIS: TimeBase = TimeBase { num: 1, den: 1000 };

    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// `pts` expressed in milliseconds; an invalid time base is read as ms.
    pub fn to_millis(&self, pts: i64) -> i64 {
        if self.num <= 0 || self.den <= 0 {
            return pts;
        }
        (pts as i128 * self.num as i128 * 1000 / self.den as i128) as i64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::MILLIS
    }
}

/// Geometry and colour facts of a decoded picture; everything the transform
/// source needs to be described.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    /// Backend pixel format id (`AVPixelFormat` for FFmpeg).
    pub format: i32,
    pub sample_aspect: (i32, i32),
    pub color_space: i32,
    pub color_range: i32,
}

impl FrameInfo {
    pub fn new(width: u32, height: u32, format: i32) -> Self {
        Self {
            width,
            height,
            format,
            sample_aspect: (1, 1),
            color_space: 2,
            color_range: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoStreamInfo {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub time_base: TimeBase,
    /// Frame count reported by the container; 0 when unknown.
    pub frame_count: i64,
}

/// What probing a source yields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceInfo {
    pub format_name: String,
    pub duration_ms: Option<i64>,
    pub video: Option<VideoStreamInfo>,
}

impl SourceInfo {
    pub fn total_duration_ms(&self) -> i64 {
        self.duration_ms.unwrap_or(0).max(0)
    }

    /// A still image or image sequence: decoded once, never paced or looped.
    pub fn is_static(&self) -> bool {
        if self.total_duration_ms() == 0 {
            return true;
        }
        if self.video.as_ref().is_some_and(|v| v.frame_count == 1) {
            return true;
        }
        let name = self.format_name.as_str();
        name.contains("image2") || name.contains("mjpeg") || name.ends_with("_pipe")
    }
}

/// Everything needed to (re)build the crop/scale transform for one region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformDescriptor {
    pub region: RegionConfig,
    pub input: FrameInfo,
    pub time_base: TimeBase,
}

impl TransformDescriptor {
    pub fn new(region: RegionConfig, input: FrameInfo, time_base: TimeBase) -> Self {
        Self {
            region,
            input,
            time_base,
        }
    }

    /// The crop box must fit the incoming picture and both sizes be non-zero.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.region.out_w == 0 || self.region.out_h == 0 {
            return Err(PipelineError::TransformBuild(format!(
                "empty output size {}x{}",
                self.region.out_w, self.region.out_h
            )));
        }
        if self.region.is_empty() {
            return Err(PipelineError::TransformBuild(format!(
                "empty crop box in {}",
                self.region
            )));
        }
        if !self.region.fits(self.input.width, self.input.height) {
            return Err(PipelineError::TransformBuild(format!(
                "{} does not fit {}x{} input",
                self.region, self.input.width, self.input.height
            )));
        }
        Ok(())
    }

    /// Arguments for the `buffer` source.
    pub fn buffer_args(&self) -> String {
        let (sar_num, sar_den) = match self.input.sample_aspect {
            (n, d) if n > 0 && d > 0 => (n, d),
            _ => (1, 1),
        };
        let (tb_num, tb_den) = if self.time_base.num > 0 && self.time_base.den > 0 {
            (self.time_base.num, self.time_base.den)
        } else {
            (1, 1000)
        };
        format!(
            "video_size={}x{}:pix_fmt={}:time_base={}/{}:pixel_aspect={}/{}:colorspace={}:range={}",
            self.input.width,
            self.input.height,
            self.input.format,
            tb_num,
            tb_den,
            sar_num,
            sar_den,
            self.input.color_space,
            self.input.color_range
        )
    }

    /// Filter chain between source and sink.
    pub fn filter_spec(&self) -> String {
        let r = &self.region;
        format!(
            "crop={}:{}:{}:{},scale={}:{},format=yuv420p",
            r.src_w, r.src_h, r.src_x, r.src_y, r.out_w, r.out_h
        )
    }
}
