use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use clap::Parser;
use roi_player::{
    PlayerConfig, RegionConfig, StreamKey, StreamOptions, StreamRegistry,
    media::backend::{FfmpegBackend, MjpegEncoder},
};
use tokio_util::sync::CancellationToken;

/// Plays one source through a region-of-interest pipeline and dumps the
/// encoded frames as JPEG files.
#[derive(Parser, Debug)]
#[command(name = "roi-player", version)]
struct Args {
    /// File path or URL of the source.
    input: String,

    /// Crop box in source pixels: x,y,w,h
    #[arg(long, value_parser = parse_quad, default_value = "0,0,640,480")]
    crop: (u32, u32, u32, u32),

    /// Output size: WxH
    #[arg(long, value_parser = parse_size, default_value = "320x240")]
    size: (u32, u32),

    /// Directory the JPEG frames are written to.
    #[arg(long, default_value = "frames")]
    out_dir: PathBuf,

    /// Poll interval for new frames, in ms.
    #[arg(long, default_value_t = 40)]
    interval_ms: u64,

    /// Stop after this many distinct frames (0 = until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    frames: u64,

    /// Force an input format, e.g. "v4l2".
    #[arg(long)]
    format: Option<String>,

    /// JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "cli")]
    device: String,

    #[arg(long, default_value_t = 0)]
    index: i32,

    /// Start paused and resume after this many ms.
    #[arg(long)]
    resume_after_ms: Option<u64>,
}

fn parse_quad(s: &str) -> Result<(u32, u32, u32, u32), String> {
    let parts: Vec<u32> = s
        .split(',')
        .map(|p| p.trim().parse::<u32>().map_err(|e| format!("{}: {}", p, e)))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, w, h] => Ok((*x, *y, *w, *h)),
        _ => Err(format!("expected x,y,w,h, got {:?}", s)),
    }
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| format!("expected WxH, got {:?}", s))?;
    let w = w.trim().parse().map_err(|e| format!("{}: {}", w, e))?;
    let h = h.trim().parse().map_err(|e| format!("{}: {}", h, e))?;
    Ok((w, h))
}

fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("roi_player", level)
        .filter_module("ffmpeg_roi", level)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = PlayerConfig::load(args.config.as_deref())?;
    init_logging(config.log_filter());

    let mut backend = FfmpegBackend::new()?;
    if let Some(format) = &args.format {
        backend = backend.with_input_format(format);
    }
    let registry = StreamRegistry::new(backend, config);

    let (x, y, w, h) = args.crop;
    let (out_w, out_h) = args.size;
    let key = StreamKey::new(args.device.clone(), args.index);
    let options = StreamOptions {
        start_paused: args.resume_after_ms.is_some(),
    };
    registry
        .add_stream_with(
            key.clone(),
            &args.input,
            RegionConfig::new(x, y, w, h, out_w, out_h),
            Box::new(MjpegEncoder::new()),
            options,
        )
        .with_context(|| format!("adding {}", args.input))?;

    tokio::fs::create_dir_all(&args.out_dir)
        .await
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("ctrl+c received");
                cancel.cancel();
            }
        });
    }

    let started = tokio::time::Instant::now();
    let mut resumed = args.resume_after_ms.is_none();
    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut written = 0u64;
    let mut last_pts = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !resumed {
            if let Some(after) = args.resume_after_ms {
                if started.elapsed() >= Duration::from_millis(after) {
                    registry.resume(&key);
                    resumed = true;
                }
            }
        }

        let frame = registry.get_next_frame(&key);
        if !frame.success || last_pts == Some((frame.pts, frame.payload.len())) {
            continue;
        }
        last_pts = Some((frame.pts, frame.payload.len()));

        let path = args.out_dir.join(format!("{}_{:06}.jpg", key, written));
        tokio::fs::write(&path, &frame.payload)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        written += 1;
        log::debug!("{}: wrote {} ({} ms)", key, path.display(), frame.pts);

        if args.frames > 0 && written >= args.frames {
            break;
        }
    }

    if let Some(stats) = registry.stats(&key) {
        log::info!("{}: {:?}", key, stats);
    }
    // joining the worker blocks
    tokio::task::spawn_blocking(move || drop(registry)).await?;
    println!("wrote {} frames to {}", written, args.out_dir.display());
    Ok(())
}
