use std::{
    sync::{Arc, atomic::Ordering},
    thread,
    time::{Duration, Instant},
};

use super::StreamRegistry;
use crate::{
    config::{PlayerConfig, StreamOptions},
    error::PipelineError,
    media::{
        pipe::PipelineState,
        synthetic::{JpegTestEncoder, SyntheticBackend, SyntheticSpec, jpeg_of, region_fill},
        types::{RegionConfig, StreamKey},
    },
};

fn registry(backend: SyntheticBackend) -> StreamRegistry<SyntheticBackend> {
    StreamRegistry::new(backend, PlayerConfig::default())
}

fn encoder() -> Box<JpegTestEncoder> {
    Box::new(JpegTestEncoder::new().0)
}

fn region() -> RegionConfig {
    RegionConfig::new(0, 0, 640, 480, 320, 240)
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    done()
}

#[test]
fn test_unknown_key() {
    let registry = registry(SyntheticBackend::new());
    let key = StreamKey::new("nobody", 0);

    let frame = registry.get_next_frame(&key);
    assert!(!frame.success);
    assert!(frame.payload.is_empty());
    assert!(!registry.pause(&key));
    assert!(!registry.resume(&key));
    assert!(!registry.update_region(&key, 0, 0, 10, 10));
    assert!(registry.delete_stream(&key));
    assert!(registry.state(&key).is_none());
    assert!(registry.is_empty());
}

#[test]
fn test_add_update_scenario() -> anyhow::Result<()> {
    let registry = registry(
        SyntheticBackend::new().with_source("file://dev1.mp4", SyntheticSpec::video(640, 480, 500, 10)),
    );
    let key = StreamKey::new("dev1", 1);
    registry.add_stream(key.clone(), "file://dev1.mp4", region(), encoder())?;
    assert_eq!(registry.len(), 1);

    thread::sleep(Duration::from_millis(300));
    let frame = registry.get_next_frame(&key);
    assert!(frame.success);
    assert_eq!((frame.width, frame.height), (320, 240));

    assert!(registry.update_region(&key, 100, 100, 300, 300));
    let moved = region().with_crop(100, 100, 300, 300);
    assert_eq!(registry.region(&key), Some(moved));
    let expected = jpeg_of(region_fill(&moved), 320, 240);

    thread::sleep(Duration::from_millis(300));
    assert!(wait_until(Duration::from_secs(1), || {
        let frame = registry.get_next_frame(&key);
        frame.success && (frame.width, frame.height) == (320, 240) && frame.payload == expected
    }));

    assert!(registry.delete_stream(&key));
    assert!(registry.is_empty());
    assert!(!registry.get_next_frame(&key).success);
    Ok(())
}

#[test]
fn test_setup_failures_register_nothing() {
    let mut no_video = SyntheticSpec::video(640, 480, 10, 10);
    no_video.has_video = false;
    let mut bad_decoder = SyntheticSpec::video(640, 480, 10, 10);
    bad_decoder.decoder_fails = true;

    let backend = SyntheticBackend::new()
        .with_source("ok", SyntheticSpec::video(640, 480, 10, 10))
        .with_source("no_video", no_video)
        .with_source("bad_decoder", bad_decoder);
    let released = Arc::clone(&backend.sources_released);
    let registry = registry(backend);
    let key = StreamKey::new("dev1", 1);

    let err = registry
        .add_stream(key.clone(), "missing", region(), encoder())
        .unwrap_err();
    assert!(matches!(err, PipelineError::SourceOpen { .. }));

    let err = registry
        .add_stream(key.clone(), "no_video", region(), encoder())
        .unwrap_err();
    assert!(matches!(err, PipelineError::NoVideoStream { .. }));

    let err = registry
        .add_stream(
            key.clone(),
            "ok",
            RegionConfig::new(400, 0, 300, 300, 320, 240),
            encoder(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::RegionBounds {
            source_width: 640,
            source_height: 480,
            ..
        }
    ));

    let err = registry
        .add_stream(key.clone(), "bad_decoder", region(), encoder())
        .unwrap_err();
    assert!(matches!(err, PipelineError::DecoderOpen(_)));

    let err = registry
        .add_stream(key.clone(), "ok", region(), Box::new(JpegTestEncoder::failing()))
        .unwrap_err();
    assert!(matches!(err, PipelineError::EncoderOpen { .. }));

    assert!(registry.is_empty());
    let opened = registry.backend().sources_opened.load(Ordering::SeqCst);
    assert_eq!(opened, 4);
    assert_eq!(released.load(Ordering::SeqCst), opened);
}

#[test]
fn test_empty_crop_inside_source_is_accepted() -> anyhow::Result<()> {
    let registry = registry(
        SyntheticBackend::new().with_source("file://z.mp4", SyntheticSpec::video(640, 480, 100, 10)),
    );
    let key = StreamKey::new("dev1", 1);
    registry.add_stream(
        key.clone(),
        "file://z.mp4",
        RegionConfig::new(0, 0, 0, 0, 320, 240),
        encoder(),
    )?;
    assert_eq!(registry.len(), 1);

    // nothing can be cropped from an empty box; frames are skipped, not fatal
    assert!(wait_until(Duration::from_secs(2), || {
        registry.get_next_frame(&key);
        registry.stats(&key).unwrap_or_default().skipped >= 2
    }));
    assert!(!registry.get_next_frame(&key).success);

    assert!(registry.update_region(&key, 0, 0, 640, 480));
    assert!(wait_until(Duration::from_secs(2), || {
        let frame = registry.get_next_frame(&key);
        frame.success && (frame.width, frame.height) == (320, 240)
    }));
    Ok(())
}

#[test]
fn test_readd_replaces_previous_pipeline() -> anyhow::Result<()> {
    let backend = SyntheticBackend::new()
        .with_source("a", SyntheticSpec::video(640, 480, 100, 10))
        .with_source("b", SyntheticSpec::still(320, 240));
    let released = Arc::clone(&backend.sources_released);
    let registry = registry(backend);
    let key = StreamKey::new("dev1", 1);

    registry.add_stream(key.clone(), "a", region(), encoder())?;
    registry.add_stream(
        key.clone(),
        "b",
        RegionConfig::new(0, 0, 320, 240, 160, 120),
        encoder(),
    )?;
    assert_eq!(registry.len(), 1);
    assert_eq!(released.load(Ordering::SeqCst), 1);

    assert!(wait_until(Duration::from_secs(2), || {
        let frame = registry.get_next_frame(&key);
        frame.success && (frame.width, frame.height) == (160, 120)
    }));
    Ok(())
}

#[test]
fn test_streams_run_independently() -> anyhow::Result<()> {
    let registry = registry(
        SyntheticBackend::new()
            .with_source("cam", SyntheticSpec::video(640, 480, 200, 10))
            .with_source("still", SyntheticSpec::still(640, 480)),
    );
    let keys: Vec<StreamKey> = (0..3).map(|i| StreamKey::new("dev", i)).collect();
    registry.add_stream(keys[0].clone(), "cam", region(), encoder())?;
    registry.add_stream(
        keys[1].clone(),
        "cam",
        RegionConfig::new(0, 0, 320, 240, 64, 64),
        encoder(),
    )?;
    registry.add_stream(keys[2].clone(), "still", region(), encoder())?;
    assert_eq!(registry.keys(), keys);

    for key in &keys {
        assert!(wait_until(Duration::from_secs(2), || {
            registry.get_next_frame(key).success
        }));
    }
    assert_eq!(registry.get_next_frame(&keys[1]).width, 64);

    // pausing one stream leaves the others running
    assert!(registry.pause(&keys[0]));
    assert!(wait_until(Duration::from_secs(1), || {
        registry.state(&keys[0]) == Some(PipelineState::Paused)
    }));
    let before = registry.stats(&keys[1]).unwrap_or_default().published;
    assert!(wait_until(Duration::from_secs(1), || {
        registry.get_next_frame(&keys[1]);
        registry.stats(&keys[1]).unwrap_or_default().published > before + 3
    }));

    assert!(registry.delete_stream(&keys[1]));
    assert_eq!(registry.keys(), vec![keys[0].clone(), keys[2].clone()]);
    assert!(registry.resume(&keys[0]));
    assert!(wait_until(Duration::from_secs(1), || {
        registry.state(&keys[0]) != Some(PipelineState::Paused)
    }));
    Ok(())
}

#[test]
fn test_concurrent_callers() -> anyhow::Result<()> {
    let registry = Arc::new(registry(
        SyntheticBackend::new().with_source("cam", SyntheticSpec::video(640, 480, 300, 5)),
    ));
    let key = StreamKey::new("dev", 7);
    registry.add_stream(key.clone(), "cam", region(), encoder())?;

    let readers: Vec<_> = (0..4)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let key = key.clone();
            thread::spawn(move || {
                let mut ok = 0;
                for n in 0..100u32 {
                    let frame = registry.get_next_frame(&key);
                    if frame.success {
                        assert_eq!((frame.width, frame.height), (320, 240));
                        ok += 1;
                    }
                    if i == 0 {
                        registry.update_region(&key, n % 50, n % 30, 200, 200);
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                ok
            })
        })
        .collect();

    let total: u32 = readers.into_iter().map(|r| r.join().unwrap()).sum();
    assert!(total > 0);
    Ok(())
}

#[test]
fn test_start_paused_option() -> anyhow::Result<()> {
    let registry = registry(
        SyntheticBackend::new().with_source("cam", SyntheticSpec::video(640, 480, 50, 10)),
    );
    let key = StreamKey::new("dev", 1);
    registry.add_stream_with(
        key.clone(),
        "cam",
        region(),
        encoder(),
        StreamOptions { start_paused: true },
    )?;
    thread::sleep(Duration::from_millis(50));
    assert!(!registry.get_next_frame(&key).success);
    assert!(registry.resume(&key));
    assert!(wait_until(Duration::from_secs(2), || {
        registry.get_next_frame(&key).success
    }));
    Ok(())
}

#[test]
fn test_drop_stops_everything() -> anyhow::Result<()> {
    let backend = SyntheticBackend::new().with_source("cam", SyntheticSpec::video(640, 480, 50, 10));
    let released = Arc::clone(&backend.sources_released);
    let registry = registry(backend);
    for i in 0..3 {
        registry.add_stream(StreamKey::new("dev", i), "cam", region(), encoder())?;
    }
    thread::sleep(Duration::from_millis(30));

    let started = Instant::now();
    drop(registry);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(released.load(Ordering::SeqCst), 3);
    Ok(())
}
