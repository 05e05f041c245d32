use std::{
    fmt::{Display, Formatter},
    sync::{
        Arc, Condvar, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use tokio_util::sync::CancellationToken;

use crate::{
    config::{PlayerConfig, StreamOptions},
    error::PipelineError,
    media::{
        capability::{
            FrameDecoder, FrameEncoder, FrameTransform, MediaBackend, MediaFrame, MediaPacket,
            MediaSource,
        },
        clock::{PaceDecision, PlaybackClock},
        exchange::FrameExchange,
        sleep::Sleeper,
        types::{EncodedFrame, FrameInfo, RegionConfig, StreamKey, TransformDescriptor, VideoStreamInfo},
    },
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Paused,
    WaitingForConsumer,
    Decoding,
    EndOfStream,
    /// Static source whose single frame has been produced.
    Idle,
    Stopped,
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Paused => "paused",
            PipelineState::WaitingForConsumer => "waiting_for_consumer",
            PipelineState::Decoding => "decoding",
            PipelineState::EndOfStream => "end_of_stream",
            PipelineState::Idle => "idle",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Point-in-time counters of one pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub decoded: u64,
    /// Frames dropped by pacing for being too late.
    pub dropped: u64,
    /// Frames lost to transform or encode failures.
    pub skipped: u64,
    pub published: u64,
    pub loops: u64,
}

#[derive(Default)]
struct Counters {
    decoded: AtomicU64,
    dropped: AtomicU64,
    skipped: AtomicU64,
    published: AtomicU64,
    loops: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StreamStats {
        StreamStats {
            decoded: self.decoded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            loops: self.loops.load(Ordering::Relaxed),
        }
    }
}

struct RegionState {
    region: RegionConfig,
    changed: bool,
}

/// State shared between the worker thread and the control surface.
struct Shared {
    key: StreamKey,
    stop: CancellationToken,
    /// `paused` flag; its condvar also parks static sources until stop.
    paused: Mutex<bool>,
    control: Condvar,
    region: Mutex<RegionState>,
    exchange: FrameExchange,
    clock: Mutex<PlaybackClock>,
    state: Mutex<PipelineState>,
    counters: Counters,
}

impl Shared {
    fn set_state(&self, state: PipelineState) {
        let mut current = lock(&self.state);
        if *current != state {
            log::trace!("{}: {} -> {}", self.key, *current, state);
            *current = state;
        }
    }

    fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Blocks while paused. False if stop was requested.
    fn wait_while_paused(&self) -> bool {
        let mut paused = lock(&self.paused);
        if *paused && !self.is_stopped() {
            self.set_state(PipelineState::Paused);
        }
        while *paused && !self.is_stopped() {
            paused = self.control.wait(paused).unwrap_or_else(|e| e.into_inner());
        }
        !self.is_stopped()
    }

    fn wait_for_stop(&self) {
        let mut guard = lock(&self.paused);
        while !self.is_stopped() {
            guard = self.control.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
    }

    fn request_stop(&self) {
        self.stop.cancel();
        {
            let _paused = lock(&self.paused);
            self.control.notify_all();
        }
        self.exchange.wake();
    }
}

/// What every pipeline of a registry shares: the backend, tuning and the
/// sleep primitive used for pacing.
pub struct PipelineContext<B: MediaBackend> {
    pub backend: Arc<B>,
    pub config: PlayerConfig,
    pub sleeper: Arc<dyn Sleeper>,
}

impl<B: MediaBackend> Clone for PipelineContext<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            sleeper: Arc::clone(&self.sleeper),
        }
    }
}

/// One source's decode/transform/encode loop running on its own thread.
pub struct StreamPipeline<B: MediaBackend> {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<PipelineWorker<B>>>>,
    is_static: bool,
}

impl<B: MediaBackend> StreamPipeline<B> {
    /// Opens everything the stream needs and starts the worker. Every
    /// resource acquired before a failure is released before returning.
    pub fn start(
        key: StreamKey,
        url: &str,
        region: RegionConfig,
        mut encoder: Box<dyn FrameEncoder<B::Frame>>,
        ctx: &PipelineContext<B>,
        options: StreamOptions,
    ) -> Result<Self, PipelineError> {
        let source = ctx.backend.open_source(url)?;
        let info = source.probe();
        let video = info
            .video
            .clone()
            .ok_or_else(|| PipelineError::NoVideoStream {
                url: url.to_string(),
            })?;
        let is_static = info.is_static();

        region.check_bounds(video.width, video.height)?;

        let decoder = ctx.backend.open_decoder(&source, &video)?;

        encoder
            .open(region.out_w, region.out_h)
            .map_err(|e| match e {
                PipelineError::EncoderOpen { .. } => e,
                other => PipelineError::EncoderOpen {
                    width: region.out_w,
                    height: region.out_h,
                    reason: other.to_string(),
                },
            })?;

        let mut clock = PlaybackClock::new(ctx.config.late_tolerance_ms);
        clock.mark_start(info.total_duration_ms());
        if options.start_paused {
            clock.pause();
        }

        let initial = if options.start_paused {
            PipelineState::Paused
        } else {
            PipelineState::Decoding
        };
        let shared = Arc::new(Shared {
            key: key.clone(),
            stop: CancellationToken::new(),
            paused: Mutex::new(options.start_paused),
            control: Condvar::new(),
            region: Mutex::new(RegionState {
                region,
                changed: false,
            }),
            exchange: FrameExchange::new(),
            clock: Mutex::new(clock),
            state: Mutex::new(initial),
            counters: Counters::default(),
        });

        log::info!(
            "{}: opened {} ({}, {}x{}, {} ms{}), {}",
            key,
            url,
            info.format_name,
            video.width,
            video.height,
            info.total_duration_ms(),
            if is_static { ", static" } else { "" },
            region
        );

        let mut worker = PipelineWorker {
            shared: Arc::clone(&shared),
            ctx: ctx.clone(),
            video,
            is_static,
            static_done: false,
            source: Some(source),
            decoder: Some(decoder),
            transform: None,
            transform_input: None,
            encoder,
            failed_region: None,
            packets_since_restart: 0,
        };

        let handle = std::thread::Builder::new()
            .name(format!("roi-{}", key))
            .spawn(move || {
                worker.run();
                worker
            })
            .map_err(PipelineError::WorkerSpawn)?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
            is_static,
        })
    }

    pub fn key(&self) -> &StreamKey {
        &self.shared.key
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Replaces the crop box; the output size is fixed. Takes effect on the
    /// next decoded frame. Bounds are checked when the transform is rebuilt.
    pub fn update_region(&self, x: u32, y: u32, w: u32, h: u32) {
        let mut state = lock(&self.shared.region);
        state.region = state.region.with_crop(x, y, w, h);
        state.changed = true;
        log::debug!("{}: region -> {}", self.shared.key, state.region);
    }

    pub fn region(&self) -> RegionConfig {
        lock(&self.shared.region).region
    }

    /// No-op while already paused; the clock keeps the first pause instant.
    pub fn pause(&self) {
        let mut paused = lock(&self.shared.paused);
        if !*paused {
            *paused = true;
            lock(&self.shared.clock).pause();
            log::debug!("{}: paused", self.shared.key);
        }
    }

    pub fn resume(&self) {
        let mut paused = lock(&self.shared.paused);
        if *paused {
            *paused = false;
            lock(&self.shared.clock).resume();
            self.shared.control.notify_all();
            log::debug!("{}: resumed", self.shared.key);
        }
    }

    pub fn is_paused(&self) -> bool {
        *lock(&self.shared.paused)
    }

    /// Most recent encoded frame; unsuccessful default before the first one.
    pub fn next_frame(&self) -> EncodedFrame {
        self.shared.exchange.take_latest()
    }

    pub fn state(&self) -> PipelineState {
        *lock(&self.shared.state)
    }

    pub fn stats(&self) -> StreamStats {
        self.shared.counters.snapshot()
    }

    /// Stops the worker, waits for it and releases its resources. Idempotent.
    pub fn shutdown(&self) {
        self.shared.request_stop();
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            match handle.join() {
                Ok(worker) => drop(worker),
                Err(_) => log::error!("{}: worker panicked", self.shared.key),
            }
            log::info!("{}: stopped", self.shared.key);
        }
        self.shared.set_state(PipelineState::Stopped);
    }
}

impl<B: MediaBackend> Drop for StreamPipeline<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct PipelineWorker<B: MediaBackend> {
    shared: Arc<Shared>,
    ctx: PipelineContext<B>,
    video: VideoStreamInfo,
    is_static: bool,
    static_done: bool,
    source: Option<B::Source>,
    decoder: Option<B::Decoder>,
    transform: Option<B::Transform>,
    /// Picture geometry the current transform was built for.
    transform_input: Option<FrameInfo>,
    encoder: Box<dyn FrameEncoder<B::Frame>>,
    /// Last region whose rebuild failed, to log each bad region once.
    failed_region: Option<RegionConfig>,
    packets_since_restart: u64,
}

impl<B: MediaBackend> PipelineWorker<B> {
    fn run(&mut self) {
        log::debug!("{}: worker started", self.shared.key);

        while !self.shared.is_stopped() {
            if !self.shared.wait_while_paused() {
                break;
            }

            if self.shared.exchange.is_pending() {
                self.shared.set_state(PipelineState::WaitingForConsumer);
                if !self.shared.exchange.wait_consumed(&self.shared.stop) {
                    break;
                }
            }

            if self.is_static && self.static_done {
                self.shared.set_state(PipelineState::Idle);
                log::debug!("{}: static frame produced, idling", self.shared.key);
                self.shared.wait_for_stop();
                break;
            }

            self.shared.set_state(PipelineState::Decoding);
            let packet = self.source.as_mut().and_then(|source| source.read_packet());
            match packet {
                Some(packet) => {
                    if packet.stream_index() != self.video.index {
                        continue;
                    }
                    self.packets_since_restart += 1;
                    let Some(decoder) = self.decoder.as_mut() else {
                        break;
                    };
                    if let Err(e) = decoder.send_packet(packet) {
                        log::debug!("{}: send packet: {}", self.shared.key, e);
                        continue;
                    }
                    self.drain_decoder();
                }
                None => self.end_of_stream(),
            }
        }

        self.shared.set_state(PipelineState::Stopped);
        log::debug!("{}: worker exiting", self.shared.key);
    }

    fn drain_decoder(&mut self) {
        loop {
            if self.is_static && self.static_done {
                return;
            }
            let Some(decoder) = self.decoder.as_mut() else {
                return;
            };
            let frame = match decoder.receive_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return,
                Err(e) => {
                    log::debug!("{}: decode: {}", self.shared.key, e);
                    return;
                }
            };
            let time_base = decoder.time_base();
            Counters::bump(&self.shared.counters.decoded);

            if !self.shared.wait_while_paused() {
                return;
            }
            self.shared.set_state(PipelineState::Decoding);

            let pts_ms = frame.pts().map(|pts| time_base.to_millis(pts));
            if !self.pace(pts_ms) {
                if self.shared.is_stopped() {
                    return;
                }
                Counters::bump(&self.shared.counters.dropped);
                continue;
            }
            self.process(frame, pts_ms.unwrap_or(0));
        }
    }

    /// Waits until the frame is due. False when it is too late or stop fired.
    fn pace(&mut self, pts_ms: Option<i64>) -> bool {
        if self.is_static {
            return true;
        }
        let Some(pts_ms) = pts_ms else {
            return true;
        };
        let decision = lock(&self.shared.clock).pace(pts_ms);
        match decision {
            PaceDecision::Deliver => true,
            PaceDecision::Sleep(duration) => self.sleep(duration),
            PaceDecision::Drop => {
                log::trace!("{}: late frame at {} ms dropped", self.shared.key, pts_ms);
                false
            }
        }
    }

    /// Sleeps in slices so a stop request is noticed within `stop_poll_ms`.
    fn sleep(&self, duration: Duration) -> bool {
        let slice = Duration::from_millis(self.ctx.config.stop_poll_ms.max(1));
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.shared.is_stopped() {
                return false;
            }
            let step = remaining.min(slice);
            self.ctx.sleeper.sleep(step);
            remaining -= step;
        }
        !self.shared.is_stopped()
    }

    fn process(&mut self, frame: B::Frame, pts_ms: i64) {
        if !self.ensure_transform(&frame) {
            Counters::bump(&self.shared.counters.skipped);
            return;
        }
        let Some(transform) = self.transform.as_mut() else {
            return;
        };

        if let Err(e) = transform.push(&frame) {
            log::debug!("{}: transform push: {}", self.shared.key, e);
            Counters::bump(&self.shared.counters.skipped);
            return;
        }
        let mut outputs = Vec::new();
        loop {
            match transform.pull() {
                Ok(Some(out)) => outputs.push(out),
                Ok(None) => break,
                Err(e) => {
                    log::debug!("{}: transform pull: {}", self.shared.key, e);
                    Counters::bump(&self.shared.counters.skipped);
                    break;
                }
            }
        }

        for out in outputs {
            self.encode_and_publish(out, pts_ms);
        }
    }

    /// Rebuilds the transform when the region changed, none exists yet, or
    /// the incoming picture geometry differs from what it was built for.
    fn ensure_transform(&mut self, frame: &B::Frame) -> bool {
        let info = frame.info();
        let region = {
            let mut state = lock(&self.shared.region);
            let stale = state.changed
                || self.transform.is_none()
                || self.transform_input != Some(info);
            if !stale {
                return true;
            }
            state.changed = false;
            state.region
        };

        self.transform = None;
        self.transform_input = None;

        let time_base = self
            .decoder
            .as_ref()
            .map(|d| d.time_base())
            .unwrap_or(self.video.time_base);
        let desc = TransformDescriptor::new(region, info, time_base);
        let built = desc
            .validate()
            .and_then(|_| self.ctx.backend.build_transform(&desc));

        match built {
            Ok(transform) => {
                log::debug!("{}: transform built: {}", self.shared.key, desc.filter_spec());
                self.transform = Some(transform);
                self.transform_input = Some(info);
                self.failed_region = None;
                true
            }
            Err(e) => {
                if self.failed_region != Some(region) {
                    log::error!("{}: rebuild for {} failed: {}", self.shared.key, region, e);
                    self.failed_region = Some(region);
                } else {
                    log::debug!("{}: rebuild for {} failed: {}", self.shared.key, region, e);
                }
                false
            }
        }
    }

    fn encode_and_publish(&mut self, frame: B::Frame, pts_ms: i64) {
        match self.encoder.encode(frame) {
            Ok(Some(mut encoded)) if encoded.success => {
                encoded.pts = pts_ms;
                if self.shared.exchange.publish(encoded, &self.shared.stop) {
                    Counters::bump(&self.shared.counters.published);
                    if self.is_static {
                        self.static_done = true;
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                log::debug!("{}: encode: {}", self.shared.key, e);
                Counters::bump(&self.shared.counters.skipped);
            }
        }
    }

    /// Drains delayed frames, then rewinds everything for the next pass.
    fn end_of_stream(&mut self) {
        self.shared.set_state(PipelineState::EndOfStream);

        if let Some(decoder) = self.decoder.as_mut() {
            if decoder.send_eof().is_ok() {
                self.drain_decoder();
            }
        }
        if self.shared.is_stopped() || (self.is_static && self.static_done) {
            return;
        }

        let seeked = match self.source.as_mut().map(|source| source.seek_to_start()) {
            Some(Ok(())) => true,
            Some(Err(e)) => {
                log::warn!("{}: seek to start: {}", self.shared.key, e);
                false
            }
            None => false,
        };
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.flush();
        }

        let region = lock(&self.shared.region).region;
        self.encoder.close();
        if let Err(e) = self.encoder.open(region.out_w, region.out_h) {
            log::error!("{}: reopen encoder: {}", self.shared.key, e);
        }
        self.transform = None;
        self.transform_input = None;
        lock(&self.shared.clock).restart();

        let loops = self.shared.counters.loops.fetch_add(1, Ordering::Relaxed) + 1;
        log::info!(
            "{}: end of stream, loop restart #{} after {} packets",
            self.shared.key,
            loops,
            self.packets_since_restart
        );

        if !seeked || self.packets_since_restart == 0 {
            self.sleep(Duration::from_millis(self.ctx.config.restart_backoff_ms));
        }
        self.packets_since_restart = 0;
    }

    fn release(&mut self) {
        self.source = None;
        self.decoder = None;
        self.transform = None;
        self.transform_input = None;
        if self.encoder.is_open() {
            self.encoder.close();
        }
    }
}

impl<B: MediaBackend> Drop for PipelineWorker<B> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "pipe_test.rs"]
mod pipe_test;
