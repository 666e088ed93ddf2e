//! video-probe
//!
//! Opens a clip, plays it against a simulated host clock and reports what the
//! engine negotiated and how conversion performed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use canvas_video::telemetry::{init_logging, ConversionStats, LogConfig};
use canvas_video::video::{FrameTexture, HwAccelMethod, MemoryTexture, VideoInfo, VideoTexture};
use canvas_video::{MediaSession, VideoPlayer, VideoSettings};
use clap::Parser;
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "video-probe",
    version,
    about = "Decode a clip through the playback engine and report conversion statistics"
)]
struct Cli {
    /// Video file to open
    path: PathBuf,

    /// Host frames to simulate
    #[arg(long, default_value_t = 120)]
    frames: u32,

    /// Simulated host refresh rate
    #[arg(long, default_value_t = 60.0)]
    fps: f32,

    /// Loop at end of stream
    #[arg(long = "loop")]
    looping: bool,

    /// Upload frames to a headless wgpu texture instead of system memory
    #[arg(long)]
    gpu: bool,

    /// Seek to this position (seconds) before playing
    #[arg(long)]
    seek: Option<f64>,

    /// Write the last converted frame as PNG
    #[arg(long = "dump-png")]
    dump_png: Option<PathBuf>,

    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct ProbeReport {
    path: String,
    codec: String,
    hwaccel: String,
    format: String,
    decode_size: (u32, u32),
    output_size: (u32, u32),
    scaled_decode: bool,
    frame_duration: f32,
    duration: f64,
    position: f64,
    state: &'static str,
    host_frames: u32,
    stats: ConversionStats,
    last_error: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(&LogConfig::default()).map_err(|e| anyhow::anyhow!(e))?;

    let settings = match &cli.config {
        Some(path) => VideoSettings::load_from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => VideoSettings::load(),
    };

    let session = MediaSession::init().context("failed to start media session")?;
    let report = if cli.gpu {
        let (device, queue) = create_device()?;
        let mut player = VideoPlayer::<VideoTexture>::open_gpu(
            &session,
            &cli.path,
            &settings,
            &device,
            Arc::new(queue),
        )
        .with_context(|| format!("failed to open {}", cli.path.display()))?;
        let report = play(&mut player, &cli)?;
        player.unload();
        report
    } else {
        let mut player = VideoPlayer::<MemoryTexture>::open_headless(&session, &cli.path, &settings)
            .with_context(|| format!("failed to open {}", cli.path.display()))?;
        let report = play(&mut player, &cli)?;
        player.unload();
        report
    };

    if !session.shutdown() {
        tracing::warn!("Media session still has {} players", session.player_count());
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.stats.decoded_frames == 0 {
        bail!("no frames were decoded from {}", report.path);
    }
    Ok(())
}

fn play<T: FrameTexture>(player: &mut VideoPlayer<T>, cli: &Cli) -> Result<ProbeReport> {
    player.set_looping(cli.looping);
    if let Some(seconds) = cli.seek {
        player.set_position_seconds(seconds)?;
    }

    let delta = 1.0 / cli.fps.max(1.0);
    for _ in 0..cli.frames {
        player.update(delta);
    }

    if let Some(path) = &cli.dump_png {
        let (width, height) = player.output_size();
        dump_png(path, width, height, player.pixels())?;
    }

    let info: VideoInfo = player.info();
    let reader = player.reader();
    Ok(ProbeReport {
        path: cli.path.display().to_string(),
        codec: reader.codec_name().to_string(),
        hwaccel: reader.hwaccel().to_string(),
        format: info.format.to_string(),
        decode_size: (info.decode_width, info.decode_height),
        output_size: (info.output_width, info.output_height),
        scaled_decode: info.scaled_decode,
        frame_duration: info.frame_duration,
        duration: info.duration,
        position: player.position_seconds(),
        state: player.state().label(),
        host_frames: cli.frames,
        stats: player.stats(),
        last_error: player.session().last_error(),
    })
}

fn dump_png(path: &Path, width: u32, height: u32, pixels: &[u8]) -> Result<()> {
    let image = image::RgbaImage::from_raw(width, height, pixels.to_vec())
        .context("pixel buffer does not match the output size")?;
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!("Wrote frame to {}", path.display());
    Ok(())
}

fn create_device() -> Result<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("no GPU adapter available")?;

        tracing::info!("Using GPU: {}", adapter.get_info().name);

        adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("video-probe device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .context("failed to create GPU device")
    })
}

fn print_report(report: &ProbeReport) {
    let hw = if report.hwaccel == HwAccelMethod::None.to_string() {
        String::new()
    } else {
        format!(" ({})", report.hwaccel)
    };
    println!("{}", report.path);
    println!("  codec:        {}{}", report.codec, hw);
    println!("  format:       {}", report.format);
    println!(
        "  decode:       {}x{}{}",
        report.decode_size.0,
        report.decode_size.1,
        if report.scaled_decode { " (scaled)" } else { "" }
    );
    println!("  output:       {}x{}", report.output_size.0, report.output_size.1);
    println!(
        "  timing:       {:.2} fps, {:.2}s long, at {:.3}s ({})",
        1.0 / report.frame_duration,
        report.duration,
        report.position,
        report.state
    );
    println!(
        "  frames:       {} decoded, {} fallback, {} staged, {} mapped",
        report.stats.decoded_frames,
        report.stats.fallback_frames,
        report.stats.gpu_staged_frames,
        report.stats.cpu_mapped_frames
    );
    println!(
        "  convert cpu:  avg {:.1}us, p95 {:.1}us, peak {:.1}us over {} samples",
        report.stats.avg_us, report.stats.p95_us, report.stats.peak_us, report.stats.sample_count
    );
    if let Some(err) = &report.last_error {
        println!("  last error:   {}", err);
    }
}
