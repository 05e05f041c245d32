//! Seams between the pipeline and whatever actually demuxes, decodes,
//! transforms and encodes. The FFmpeg implementation lives in
//! `media::backend`; tests plug in synthetic ones.

use crate::error::PipelineError;
use crate::media::types::{
    EncodedFrame, FrameInfo, SourceInfo, TimeBase, TransformDescriptor, VideoStreamInfo,
};

pub trait MediaPacket: Send {
    fn stream_index(&self) -> usize;
}

pub trait MediaFrame: Send {
    /// Presentation timestamp in the decoder's time base.
    fn pts(&self) -> Option<i64>;
    fn info(&self) -> FrameInfo;
}

pub trait MediaSource: Send {
    type Packet: MediaPacket;

    fn probe(&self) -> SourceInfo;
    /// Next packet of any stream; `None` at end of stream.
    fn read_packet(&mut self) -> Option<Self::Packet>;
    fn seek_to_start(&mut self) -> Result<(), PipelineError>;
}

pub trait FrameDecoder: Send {
    type Packet;
    type Frame: MediaFrame;

    fn send_packet(&mut self, packet: Self::Packet) -> Result<(), PipelineError>;
    fn send_eof(&mut self) -> Result<(), PipelineError>;
    /// `Ok(None)` when the decoder wants more input.
    fn receive_frame(&mut self) -> Result<Option<Self::Frame>, PipelineError>;
    /// Drop buffered state; the decoder accepts packets again afterwards.
    fn flush(&mut self);
    /// Unit of the decoded frames' `pts`.
    fn time_base(&self) -> TimeBase;
}

pub trait FrameTransform: Send {
    type Frame;

    fn push(&mut self, frame: &Self::Frame) -> Result<(), PipelineError>;
    fn pull(&mut self) -> Result<Option<Self::Frame>, PipelineError>;
}

/// Turns transformed frames into published payloads. One instance per stream,
/// handed over in `add_stream`.
pub trait FrameEncoder<F>: Send {
    fn open(&mut self, width: u32, height: u32) -> Result<(), PipelineError>;
    /// `Ok(None)` when the codec produced no output for this frame yet.
    fn encode(&mut self, frame: F) -> Result<Option<EncodedFrame>, PipelineError>;
    fn close(&mut self);
    fn is_open(&self) -> bool;

    /// Reopens only when the size differs from the current one.
    fn reset(&mut self, width: u32, height: u32) -> Result<(), PipelineError>;
}

pub trait MediaBackend: Send + Sync + 'static {
    type Packet: MediaPacket;
    type Frame: MediaFrame;
    type Source: MediaSource<Packet = Self::Packet>;
    type Decoder: FrameDecoder<Packet = Self::Packet, Frame = Self::Frame>;
    type Transform: FrameTransform<Frame = Self::Frame>;

    fn open_source(&self, url: &str) -> Result<Self::Source, PipelineError>;
    fn open_decoder(
        &self,
        source: &Self::Source,
        stream: &VideoStreamInfo,
    ) -> Result<Self::Decoder, PipelineError>;
    fn build_transform(&self, desc: &TransformDescriptor) -> Result<Self::Transform, PipelineError>;
}
