use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    config::{PlayerConfig, StreamOptions},
    error::PipelineError,
    media::{
        capability::{FrameEncoder, MediaBackend},
        pipe::{PipelineContext, PipelineState, StreamPipeline, StreamStats},
        sleep::{PreciseSleep, Sleeper},
        types::{EncodedFrame, RegionConfig, StreamKey},
    },
};

type PipelineMap<B> = HashMap<StreamKey, Arc<StreamPipeline<B>>>;

/// Owns every running pipeline. The map lock is only held for insert,
/// remove and lookup; opening sources and joining workers happen outside it.
pub struct StreamRegistry<B: MediaBackend> {
    ctx: PipelineContext<B>,
    pipelines: Mutex<PipelineMap<B>>,
}

impl<B: MediaBackend> StreamRegistry<B> {
    pub fn new(backend: B, config: PlayerConfig) -> Self {
        Self::with_sleeper(backend, config, Arc::new(PreciseSleep))
    }

    pub fn with_sleeper(backend: B, config: PlayerConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            ctx: PipelineContext {
                backend: Arc::new(backend),
                config,
                sleeper,
            },
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    fn map(&self) -> MutexGuard<'_, PipelineMap<B>> {
        self.pipelines.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn get(&self, key: &StreamKey) -> Option<Arc<StreamPipeline<B>>> {
        self.map().get(key).cloned()
    }

    pub fn backend(&self) -> &B {
        &self.ctx.backend
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.ctx.config
    }

    pub fn add_stream(
        &self,
        key: StreamKey,
        url: &str,
        region: RegionConfig,
        encoder: Box<dyn FrameEncoder<B::Frame>>,
    ) -> Result<(), PipelineError> {
        self.add_stream_with(key, url, region, encoder, StreamOptions::default())
    }

    /// Opens `url` and starts a pipeline for it under `key`. Nothing is
    /// registered on failure. An existing pipeline under the same key is
    /// replaced and torn down.
    pub fn add_stream_with(
        &self,
        key: StreamKey,
        url: &str,
        region: RegionConfig,
        encoder: Box<dyn FrameEncoder<B::Frame>>,
        options: StreamOptions,
    ) -> Result<(), PipelineError> {
        let pipeline =
            match StreamPipeline::start(key.clone(), url, region, encoder, &self.ctx, options) {
                Ok(pipeline) => Arc::new(pipeline),
                Err(e) => {
                    log::error!("{}: add stream {} failed: {}", key, url, e);
                    return Err(e);
                }
            };

        let previous = self.map().insert(key.clone(), pipeline);
        if let Some(previous) = previous {
            log::warn!("{}: replaced existing stream", key);
            previous.shutdown();
        }
        log::info!("{}: stream added", key);
        Ok(())
    }

    /// Removes and tears down the pipeline. Always true; deleting an unknown
    /// key is not an error.
    pub fn delete_stream(&self, key: &StreamKey) -> bool {
        let removed = self.map().remove(key);
        if let Some(pipeline) = removed {
            pipeline.shutdown();
            log::info!("{}: stream deleted", key);
        }
        true
    }

    pub fn update_region(&self, key: &StreamKey, x: u32, y: u32, w: u32, h: u32) -> bool {
        match self.get(key) {
            Some(pipeline) => {
                pipeline.update_region(x, y, w, h);
                true
            }
            None => false,
        }
    }

    pub fn pause(&self, key: &StreamKey) -> bool {
        match self.get(key) {
            Some(pipeline) => {
                pipeline.pause();
                true
            }
            None => false,
        }
    }

    pub fn resume(&self, key: &StreamKey) -> bool {
        match self.get(key) {
            Some(pipeline) => {
                pipeline.resume();
                true
            }
            None => false,
        }
    }

    /// Latest frame of `key`; an unsuccessful default if the key is unknown
    /// or nothing was produced yet.
    pub fn get_next_frame(&self, key: &StreamKey) -> EncodedFrame {
        self.get(key)
            .map(|pipeline| pipeline.next_frame())
            .unwrap_or_default()
    }

    pub fn region(&self, key: &StreamKey) -> Option<RegionConfig> {
        self.get(key).map(|pipeline| pipeline.region())
    }

    pub fn state(&self, key: &StreamKey) -> Option<PipelineState> {
        self.get(key).map(|pipeline| pipeline.state())
    }

    pub fn stats(&self, key: &StreamKey) -> Option<StreamStats> {
        self.get(key).map(|pipeline| pipeline.stats())
    }

    pub fn keys(&self) -> Vec<StreamKey> {
        let mut keys: Vec<StreamKey> = self.map().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    /// Tears down every pipeline.
    pub fn clear(&self) {
        let drained: Vec<_> = self.map().drain().collect();
        for (key, pipeline) in drained {
            pipeline.shutdown();
            log::debug!("{}: stream cleared", key);
        }
    }
}

impl<B: MediaBackend> Drop for StreamRegistry<B> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod manager_test;
