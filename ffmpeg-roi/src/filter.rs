use ffmpeg_next::{filter, frame::Video, util::error};

use crate::frame::RawVideoFrame;

/// Single-input, single-output video filter graph: `buffer -> <chain> -> buffersink`.
///
/// The `buffer` source is described by an argument string such as
/// `video_size=640x480:pix_fmt=0:time_base=1/25:pixel_aspect=1/1`, the chain by a
/// regular filtergraph description such as `crop=320:240:0:0,scale=160:120`.
pub struct VideoFilter {
    graph: filter::Graph,
}

unsafe impl Send for VideoFilter {}

impl VideoFilter {
    pub fn new(buffer_args: &str, spec: &str) -> anyhow::Result<Self> {
        let mut graph = filter::Graph::new();

        let buffer = filter::find("buffer").ok_or(anyhow::anyhow!("buffer filter not found"))?;
        let buffersink =
            filter::find("buffersink").ok_or(anyhow::anyhow!("buffersink filter not found"))?;

        graph.add(&buffer, "in", buffer_args)?;
        graph.add(&buffersink, "out", "")?;
        graph.output("in", 0)?.input("out", 0)?.parse(spec)?;
        graph.validate()?;

        log::debug!("video filter built: [{}] {}", buffer_args, spec);

        Ok(Self { graph })
    }

    pub fn push(&mut self, frame: &RawVideoFrame) -> anyhow::Result<()> {
        let mut source = self
            .graph
            .get("in")
            .ok_or(anyhow::anyhow!("filter source missing"))?;
        source.source().add(frame.as_video())?;
        Ok(())
    }

    /// Next filtered picture; `Ok(None)` when the graph needs more input.
    pub fn pull(&mut self) -> anyhow::Result<Option<RawVideoFrame>> {
        let mut out = Video::empty();
        let mut sink = self
            .graph
            .get("out")
            .ok_or(anyhow::anyhow!("filter sink missing"))?;
        match sink.sink().frame(&mut out) {
            Ok(()) => Ok(Some(RawVideoFrame::from(out))),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(ffmpeg_next::Error::Other { errno }) if errno == error::EAGAIN => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
