use ffmpeg_roi::metadata::{probe, summarize};

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "scripts/test.mp4".to_string());

    ffmpeg_roi::init()?;

    let info = probe(&path)?;
    print!("{}", info);

    let summary = summarize(&path)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
