//! FFmpeg implementation of the media capabilities, on top of `ffmpeg-roi`.

use ffmpeg_roi::{
    decoder::Decoder,
    encoder::{Encoder, Settings},
    filter::VideoFilter,
    frame::RawVideoFrame,
    input::AvInput,
    packet::RawPacket,
};

use crate::{
    error::PipelineError,
    media::{
        capability::{
            FrameDecoder, FrameEncoder, FrameTransform, MediaBackend, MediaFrame, MediaPacket,
            MediaSource,
        },
        types::{
            EncodedFrame, FrameInfo, SourceInfo, TimeBase, TransformDescriptor, VideoStreamInfo,
        },
    },
};

pub struct FfmpegPacket(RawPacket);

impl MediaPacket for FfmpegPacket {
    fn stream_index(&self) -> usize {
        self.0.index()
    }
}

pub struct FfmpegFrame(RawVideoFrame);

unsafe impl Send for FfmpegFrame {}

impl MediaFrame for FfmpegFrame {
    fn pts(&self) -> Option<i64> {
        self.0.timestamp()
    }

    fn info(&self) -> FrameInfo {
        let sar = self.0.sample_aspect_ratio();
        FrameInfo {
            width: self.0.width(),
            height: self.0.height(),
            format: self.0.format_raw(),
            sample_aspect: (sar.numerator(), sar.denominator()),
            color_space: self.0.color_space_raw(),
            color_range: self.0.color_range_raw(),
        }
    }
}

pub struct FfmpegSource {
    input: AvInput,
}

impl MediaSource for FfmpegSource {
    type Packet = FfmpegPacket;

    fn probe(&self) -> SourceInfo {
        SourceInfo {
            format_name: self.input.format_name(),
            duration_ms: self.input.duration_ms(),
            video: self.input.best_video_stream().map(|stream| {
                let tb = stream.time_base();
                VideoStreamInfo {
                    index: stream.index(),
                    width: stream.width(),
                    height: stream.height(),
                    time_base: TimeBase::new(tb.numerator(), tb.denominator()),
                    frame_count: stream.frames(),
                }
            }),
        }
    }

    fn read_packet(&mut self) -> Option<FfmpegPacket> {
        self.input.read_packet().map(FfmpegPacket)
    }

    fn seek_to_start(&mut self) -> Result<(), PipelineError> {
        self.input
            .seek_to_start()
            .map_err(|e| PipelineError::Source(format!("{:#}", e)))
    }
}

pub struct FfmpegDecoder(Decoder);

impl FrameDecoder for FfmpegDecoder {
    type Packet = FfmpegPacket;
    type Frame = FfmpegFrame;

    fn send_packet(&mut self, packet: FfmpegPacket) -> Result<(), PipelineError> {
        self.0
            .send_packet(packet.0)
            .map_err(|e| PipelineError::Codec(format!("{:#}", e)))
    }

    fn send_eof(&mut self) -> Result<(), PipelineError> {
        self.0
            .send_eof()
            .map_err(|e| PipelineError::Codec(format!("{:#}", e)))
    }

    fn receive_frame(&mut self) -> Result<Option<FfmpegFrame>, PipelineError> {
        self.0
            .receive_frame()
            .map(|frame| frame.map(FfmpegFrame))
            .map_err(|e| PipelineError::Codec(format!("{:#}", e)))
    }

    fn flush(&mut self) {
        self.0.flush();
    }

    fn time_base(&self) -> TimeBase {
        let tb = self.0.time_base();
        TimeBase::new(tb.numerator(), tb.denominator())
    }
}

pub struct FfmpegTransform(VideoFilter);

impl FrameTransform for FfmpegTransform {
    type Frame = FfmpegFrame;

    fn push(&mut self, frame: &FfmpegFrame) -> Result<(), PipelineError> {
        self.0
            .push(&frame.0)
            .map_err(|e| PipelineError::TransformBuild(format!("{:#}", e)))
    }

    fn pull(&mut self) -> Result<Option<FfmpegFrame>, PipelineError> {
        self.0
            .pull()
            .map(|frame| frame.map(FfmpegFrame))
            .map_err(|e| PipelineError::TransformBuild(format!("{:#}", e)))
    }
}

/// Opens sources with libavformat, decodes with libavcodec and crops/scales
/// with a libavfilter graph.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    input_format: Option<String>,
}

impl FfmpegBackend {
    pub fn new() -> anyhow::Result<Self> {
        ffmpeg_roi::init()?;
        Ok(Self::default())
    }

    /// Forces a demuxer (e.g. "v4l2", "image2") instead of probing.
    pub fn with_input_format(mut self, format: impl Into<String>) -> Self {
        self.input_format = Some(format.into());
        self
    }
}

impl MediaBackend for FfmpegBackend {
    type Packet = FfmpegPacket;
    type Frame = FfmpegFrame;
    type Source = FfmpegSource;
    type Decoder = FfmpegDecoder;
    type Transform = FfmpegTransform;

    fn open_source(&self, url: &str) -> Result<FfmpegSource, PipelineError> {
        let input = AvInput::new(url, self.input_format.as_deref(), None).map_err(|e| {
            PipelineError::SourceOpen {
                url: url.to_string(),
                reason: format!("{:#}", e),
            }
        })?;
        Ok(FfmpegSource { input })
    }

    fn open_decoder(
        &self,
        source: &FfmpegSource,
        stream: &VideoStreamInfo,
    ) -> Result<FfmpegDecoder, PipelineError> {
        let av_stream = source
            .input
            .stream(stream.index)
            .ok_or_else(|| PipelineError::DecoderOpen(format!("stream {} missing", stream.index)))?;
        Decoder::new(av_stream)
            .map(FfmpegDecoder)
            .map_err(|e| PipelineError::DecoderOpen(format!("{:#}", e)))
    }

    fn build_transform(&self, desc: &TransformDescriptor) -> Result<FfmpegTransform, PipelineError> {
        VideoFilter::new(&desc.buffer_args(), &desc.filter_spec())
            .map(FfmpegTransform)
            .map_err(|e| PipelineError::TransformBuild(format!("{:#}", e)))
    }
}

/// Default per-stream encoder: one baseline JPEG per frame.
#[derive(Default)]
pub struct MjpegEncoder {
    inner: Option<Encoder>,
}

impl MjpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameEncoder<FfmpegFrame> for MjpegEncoder {
    fn open(&mut self, width: u32, height: u32) -> Result<(), PipelineError> {
        let encoder = Encoder::new(Settings::mjpeg(width, height), None).map_err(|e| {
            PipelineError::EncoderOpen {
                width,
                height,
                reason: format!("{:#}", e),
            }
        })?;
        self.inner = Some(encoder);
        Ok(())
    }

    fn encode(&mut self, frame: FfmpegFrame) -> Result<Option<EncodedFrame>, PipelineError> {
        let encoder = self
            .inner
            .as_mut()
            .ok_or_else(|| PipelineError::Codec("mjpeg encoder not open".to_string()))?;
        let (width, height) = (encoder.width(), encoder.height());
        let packet = encoder
            .encode(frame.0)
            .map_err(|e| PipelineError::Codec(format!("{:#}", e)))?;
        Ok(packet.map(|packet| {
            EncodedFrame::new(packet.data(), width, height, packet.pts().unwrap_or(0))
        }))
    }

    fn close(&mut self) {
        self.inner = None;
    }

    fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn reset(&mut self, width: u32, height: u32) -> Result<(), PipelineError> {
        if let Some(encoder) = self.inner.as_ref() {
            if encoder.width() == width && encoder.height() == height {
                return Ok(());
            }
        }
        self.close();
        self.open(width, height)
    }
}
