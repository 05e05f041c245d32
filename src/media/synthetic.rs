//! Deterministic in-memory backend for exercising the pipeline without FFmpeg.
//!
//! Sources are registered by name. Each video packet decodes to exactly one
//! frame whose pts advances by `interval_ms`; the transform stamps a fill
//! value derived from the crop box onto its output, and the encoder turns
//! that into a real grayscale JPEG of the output size.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use bytes::Bytes;

use crate::{
    error::PipelineError,
    media::{
        capability::{
            FrameDecoder, FrameEncoder, FrameTransform, MediaBackend, MediaFrame, MediaPacket,
            MediaSource,
        },
        types::{
            EncodedFrame, FrameInfo, RegionConfig, SourceInfo, TimeBase, TransformDescriptor,
            VideoStreamInfo,
        },
    },
};

/// yuv420p in FFmpeg's numbering, only used as an opaque tag here.
const FORMAT_YUV420P: i32 = 0;

#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub width: u32,
    pub height: u32,
    /// Video packets per pass.
    pub frames: u32,
    pub interval_ms: i64,
    pub format_name: String,
    pub duration_ms: Option<i64>,
    pub frame_count: i64,
    pub has_video: bool,
    /// Interleave a non-video packet after every video packet.
    pub with_audio: bool,
    pub decoder_fails: bool,
    pub seek_fails: bool,
}

impl SyntheticSpec {
    pub fn video(width: u32, height: u32, frames: u32, interval_ms: i64) -> Self {
        Self {
            width,
            height,
            frames,
            interval_ms,
            format_name: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            duration_ms: Some(frames as i64 * interval_ms),
            frame_count: frames as i64,
            has_video: true,
            with_audio: true,
            decoder_fails: false,
            seek_fails: false,
        }
    }

    pub fn still(width: u32, height: u32) -> Self {
        Self {
            format_name: "image2".to_string(),
            duration_ms: None,
            frame_count: 1,
            with_audio: false,
            ..Self::video(width, height, 1, 40)
        }
    }
}

/// The value the synthetic transform fills its output with for `region`.
pub fn region_fill(region: &RegionConfig) -> u8 {
    ((region.src_x / 4 + region.src_y / 4 + region.src_w / 8 + region.src_h / 8) % 200 + 20) as u8
}

pub struct SynPacket {
    stream_index: usize,
    seq: i64,
}

impl MediaPacket for SynPacket {
    fn stream_index(&self) -> usize {
        self.stream_index
    }
}

#[derive(Debug, Clone)]
pub struct SynFrame {
    pub pts: Option<i64>,
    pub info: FrameInfo,
    pub fill: u8,
}

impl MediaFrame for SynFrame {
    fn pts(&self) -> Option<i64> {
        self.pts
    }

    fn info(&self) -> FrameInfo {
        self.info
    }
}

pub struct SynSource {
    spec: SyntheticSpec,
    next: u32,
    audio_due: bool,
    released: Arc<AtomicUsize>,
}

impl MediaSource for SynSource {
    type Packet = SynPacket;

    fn probe(&self) -> SourceInfo {
        SourceInfo {
            format_name: self.spec.format_name.clone(),
            duration_ms: self.spec.duration_ms,
            video: self.spec.has_video.then(|| VideoStreamInfo {
                index: 0,
                width: self.spec.width,
                height: self.spec.height,
                time_base: TimeBase::MILLIS,
                frame_count: self.spec.frame_count,
            }),
        }
    }

    fn read_packet(&mut self) -> Option<SynPacket> {
        if self.audio_due {
            self.audio_due = false;
            return Some(SynPacket {
                stream_index: 1,
                seq: -1,
            });
        }
        if self.next >= self.spec.frames {
            return None;
        }
        let seq = self.next as i64;
        self.next += 1;
        self.audio_due = self.spec.with_audio;
        Some(SynPacket {
            stream_index: 0,
            seq,
        })
    }

    fn seek_to_start(&mut self) -> Result<(), PipelineError> {
        if self.spec.seek_fails {
            return Err(PipelineError::Source("not seekable".to_string()));
        }
        self.next = 0;
        self.audio_due = false;
        Ok(())
    }
}

impl Drop for SynSource {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct SynDecoder {
    info: FrameInfo,
    foreign: Arc<AtomicUsize>,
    interval_ms: i64,
    queue: VecDeque<SynFrame>,
}

impl FrameDecoder for SynDecoder {
    type Packet = SynPacket;
    type Frame = SynFrame;

    fn send_packet(&mut self, packet: SynPacket) -> Result<(), PipelineError> {
        if packet.stream_index != 0 {
            self.foreign.fetch_add(1, Ordering::SeqCst);
            return Err(PipelineError::Codec("not a video packet".to_string()));
        }
        self.queue.push_back(SynFrame {
            pts: Some(packet.seq * self.interval_ms),
            info: self.info,
            fill: (packet.seq % 256) as u8,
        });
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<SynFrame>, PipelineError> {
        Ok(self.queue.pop_front())
    }

    fn flush(&mut self) {
        self.queue.clear();
    }

    fn time_base(&self) -> TimeBase {
        TimeBase::MILLIS
    }
}

pub struct SynTransform {
    region: RegionConfig,
    format: i32,
    out: Option<SynFrame>,
}

impl FrameTransform for SynTransform {
    type Frame = SynFrame;

    fn push(&mut self, frame: &SynFrame) -> Result<(), PipelineError> {
        let mut info = FrameInfo::new(self.region.out_w, self.region.out_h, self.format);
        info.sample_aspect = frame.info.sample_aspect;
        self.out = Some(SynFrame {
            pts: frame.pts,
            info,
            fill: region_fill(&self.region),
        });
        Ok(())
    }

    fn pull(&mut self) -> Result<Option<SynFrame>, PipelineError> {
        Ok(self.out.take())
    }
}

#[derive(Default)]
pub struct SyntheticBackend {
    specs: Mutex<HashMap<String, SyntheticSpec>>,
    pub transform_builds: AtomicUsize,
    pub transform_fails: AtomicBool,
    pub sources_opened: AtomicUsize,
    pub sources_released: Arc<AtomicUsize>,
    /// Non-video packets that reached a decoder.
    pub foreign_packets: Arc<AtomicUsize>,
    pub descriptors: Mutex<Vec<String>>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(self, url: &str, spec: SyntheticSpec) -> Self {
        self.add_source(url, spec);
        self
    }

    pub fn add_source(&self, url: &str, spec: SyntheticSpec) {
        self.specs
            .lock()
            .unwrap()
            .insert(url.to_string(), spec);
    }
}

impl MediaBackend for SyntheticBackend {
    type Packet = SynPacket;
    type Frame = SynFrame;
    type Source = SynSource;
    type Decoder = SynDecoder;
    type Transform = SynTransform;

    fn open_source(&self, url: &str) -> Result<SynSource, PipelineError> {
        let spec = self
            .specs
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::SourceOpen {
                url: url.to_string(),
                reason: "no such synthetic source".to_string(),
            })?;
        self.sources_opened.fetch_add(1, Ordering::SeqCst);
        Ok(SynSource {
            spec,
            next: 0,
            audio_due: false,
            released: Arc::clone(&self.sources_released),
        })
    }

    fn open_decoder(
        &self,
        source: &SynSource,
        stream: &VideoStreamInfo,
    ) -> Result<SynDecoder, PipelineError> {
        if source.spec.decoder_fails {
            return Err(PipelineError::DecoderOpen("synthetic decoder refused".to_string()));
        }
        Ok(SynDecoder {
            info: FrameInfo::new(stream.width, stream.height, FORMAT_YUV420P),
            foreign: Arc::clone(&self.foreign_packets),
            interval_ms: source.spec.interval_ms,
            queue: VecDeque::new(),
        })
    }

    fn build_transform(&self, desc: &TransformDescriptor) -> Result<SynTransform, PipelineError> {
        self.transform_builds.fetch_add(1, Ordering::SeqCst);
        self.descriptors
            .lock()
            .unwrap()
            .push(format!("[{}] {}", desc.buffer_args(), desc.filter_spec()));
        if self.transform_fails.load(Ordering::SeqCst) {
            return Err(PipelineError::TransformBuild("synthetic failure".to_string()));
        }
        Ok(SynTransform {
            region: desc.region,
            format: desc.input.format,
            out: None,
        })
    }
}

/// Counters shared between a [`JpegTestEncoder`] and the test that made it.
#[derive(Default)]
pub struct EncoderProbe {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub encodes: AtomicUsize,
}

/// Grayscale JPEG encoder; the fill value of each frame becomes its luma.
pub struct JpegTestEncoder {
    size: Option<(u32, u32)>,
    fail_open: bool,
    probe: Arc<EncoderProbe>,
}

impl JpegTestEncoder {
    pub fn new() -> (Self, Arc<EncoderProbe>) {
        let probe = Arc::new(EncoderProbe::default());
        (
            Self {
                size: None,
                fail_open: false,
                probe: Arc::clone(&probe),
            },
            probe,
        )
    }

    pub fn failing() -> Self {
        let (mut encoder, _) = Self::new();
        encoder.fail_open = true;
        encoder
    }
}

impl FrameEncoder<SynFrame> for JpegTestEncoder {
    fn open(&mut self, width: u32, height: u32) -> Result<(), PipelineError> {
        if self.fail_open || width == 0 || height == 0 {
            return Err(PipelineError::EncoderOpen {
                width,
                height,
                reason: "synthetic encoder refused".to_string(),
            });
        }
        self.size = Some((width, height));
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn encode(&mut self, frame: SynFrame) -> Result<Option<EncodedFrame>, PipelineError> {
        let (width, height) = self
            .size
            .ok_or_else(|| PipelineError::Codec("encoder not open".to_string()))?;
        if frame.info.width != width || frame.info.height != height {
            return Err(PipelineError::Codec(format!(
                "frame {}x{} does not match encoder {}x{}",
                frame.info.width, frame.info.height, width, height
            )));
        }

        let luma = vec![frame.fill; width as usize * height as usize];
        let mut payload = Vec::new();
        jpeg_encoder::Encoder::new(&mut payload, 80)
            .encode(&luma, width as u16, height as u16, jpeg_encoder::ColorType::Luma)
            .map_err(|e| PipelineError::Codec(e.to_string()))?;
        self.probe.encodes.fetch_add(1, Ordering::SeqCst);

        Ok(Some(EncodedFrame::new(
            Bytes::from(payload),
            width,
            height,
            frame.pts.unwrap_or(0),
        )))
    }

    fn close(&mut self) {
        if self.size.take().is_some() {
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_open(&self) -> bool {
        self.size.is_some()
    }

    fn reset(&mut self, width: u32, height: u32) -> Result<(), PipelineError> {
        if self.size == Some((width, height)) {
            return Ok(());
        }
        self.close();
        self.open(width, height)
    }
}

/// The exact payload [`JpegTestEncoder`] produces for a `fill` frame; JPEG
/// encoding is deterministic, so tests compare bytes.
pub fn jpeg_of(fill: u8, width: u32, height: u32) -> Vec<u8> {
    let luma = vec![fill; width as usize * height as usize];
    let mut encoded = Vec::new();
    jpeg_encoder::Encoder::new(&mut encoded, 80)
        .encode(&luma, width as u16, height as u16, jpeg_encoder::ColorType::Luma)
        .expect("encode test jpeg");
    encoded
}
