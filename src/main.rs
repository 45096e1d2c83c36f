mod capture;
mod output;
mod segmentation;
mod transport;
mod tuning;

use anyhow::{Context, Result};
use capture::{ImageDirSource, WebcamCapture};
use clap::Parser;
use output::{OutputSink, PngDirSink, V4L2Output};
use segmentation::{SegmentationPipeline, ThresholdBounds, ThresholdState};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use transport::{FrameReceiver, ImageMessage, Subscription};

/// How often the consumer loop wakes up to check for shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Log stats every this many frames
const STATS_EVERY: u64 = 30;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0, conflicts_with = "input_dir")]
    input_device: u32,

    /// Replay images from this directory instead of a webcam
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Replay rate for --input-dir
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Restart --input-dir from the first image when it runs out
    #[arg(long)]
    loop_input: bool,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10", conflicts_with = "output_dir")]
    output_device: String,

    /// Write masks as PNG files into this directory instead of a loopback device
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output resolution width
    #[arg(long, default_value_t = 640)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 480)]
    output_height: u32,

    /// Initial lower hue bound [0, 180]
    #[arg(long, default_value_t = ThresholdBounds::default().low[0])]
    lower_h: u16,

    /// Initial upper hue bound [0, 180]
    #[arg(long, default_value_t = ThresholdBounds::default().high[0])]
    upper_h: u16,

    /// Initial lower saturation bound [0, 256]
    #[arg(long, default_value_t = ThresholdBounds::default().low[1])]
    lower_s: u16,

    /// Initial upper saturation bound [0, 256]
    #[arg(long, default_value_t = ThresholdBounds::default().high[1])]
    upper_s: u16,

    /// Initial lower value bound [0, 256]
    #[arg(long, default_value_t = ThresholdBounds::default().low[2])]
    lower_v: u16,

    /// Initial upper value bound [0, 256]
    #[arg(long, default_value_t = ThresholdBounds::default().high[2])]
    upper_v: u16,

    /// Do not read threshold commands from stdin
    #[arg(long)]
    no_tuning: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn initial_thresholds(&self) -> ThresholdState {
        // Goes through `set` so out-of-range arguments are clamped
        let state = ThresholdState::new(ThresholdBounds::FULL_RANGE);
        state.store(ThresholdBounds {
            low: [self.lower_h, self.lower_s, self.lower_v],
            high: [self.upper_h, self.upper_s, self.upper_v],
        });
        state
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("hsv-track starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            tracing::info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("Failed to install Ctrl+C handler")?;
    }

    let thresholds = Arc::new(args.initial_thresholds());
    tracing::info!("Initial thresholds {}", thresholds.read());
    if !args.no_tuning {
        tuning::spawn_stdin_tuner(Arc::clone(&thresholds))?;
    }

    // Initialize output
    let mut output: Box<dyn OutputSink> = match &args.output_dir {
        Some(dir) => Box::new(PngDirSink::new(dir).context("Failed to initialize PNG output")?),
        None => Box::new(
            V4L2Output::new(&args.output_device, args.output_width, args.output_height)
                .context("Failed to initialize v4l2loopback output")?,
        ),
    };

    // Initialize capture
    let subscription = match args.input_dir.clone() {
        Some(dir) => {
            let (fps, looping) = (args.fps, args.loop_input);
            transport::subscribe(move || ImageDirSource::new(dir, fps, looping), Arc::clone(&shutdown))?
        }
        None => {
            let device = args.input_device;
            transport::subscribe(move || WebcamCapture::new(device), Arc::clone(&shutdown))?
        }
    };

    let pipeline = SegmentationPipeline::new(thresholds);
    let result = run_pipeline(&subscription.frames, output.as_mut(), &pipeline, &shutdown);

    // Stop consuming: the capture thread sees the flag after its current frame
    shutdown.store(true, Ordering::SeqCst);
    let capture_result = join_capture(subscription);

    result?;
    capture_result?;
    tracing::info!("hsv-track stopped");
    Ok(())
}

fn join_capture(subscription: Subscription) -> Result<()> {
    subscription.join().context("Capture failed")
}

#[derive(Default)]
struct Stats {
    frames: u64,
    rejected: u64,
    segment_time: Duration,
    output_time: Duration,
    latency: Duration,
}

impl Stats {
    fn log(&self, dropped: u64) {
        let n = self.frames as f64;
        let avg_segment_ms = self.segment_time.as_secs_f64() * 1000.0 / n;
        let avg_output_ms = self.output_time.as_secs_f64() * 1000.0 / n;
        let avg_latency_ms = self.latency.as_secs_f64() * 1000.0 / n;
        let fps = 1000.0 / (avg_segment_ms + avg_output_ms).max(f64::EPSILON);

        tracing::info!(
            "Frame {}: segment={:.1}ms, output={:.1}ms, latency={:.1}ms, fps={:.1}, dropped={}, rejected={}",
            self.frames,
            avg_segment_ms,
            avg_output_ms,
            avg_latency_ms,
            fps,
            dropped,
            self.rejected
        );
    }
}

/// Consume frames back to back until the source ends or shutdown is raised
fn run_pipeline(
    frames: &FrameReceiver,
    output: &mut dyn OutputSink,
    pipeline: &SegmentationPipeline,
    shutdown: &AtomicBool,
) -> Result<()> {
    let mut stats = Stats::default();

    tracing::info!("Starting main pipeline loop");
    if let Some((width, height)) = output.resolution() {
        tracing::info!("Output: {}x{}", width, height);
    }
    tracing::info!("Press Ctrl+C to stop");

    while !shutdown.load(Ordering::SeqCst) {
        let frame = match frames.recv_timeout(POLL_INTERVAL) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            // Source finished or failed; the capture thread reports why
            Err(_) => break,
        };

        let (seq, captured_at) = (frame.seq, frame.captured_at);

        let segment_start = Instant::now();
        let mask = match pipeline.process(frame) {
            Ok(mask) => mask,
            Err(err) => {
                stats.rejected += 1;
                tracing::warn!("Dropping frame: {:#}", anyhow::Error::new(err));
                continue;
            }
        };
        stats.segment_time += segment_start.elapsed();

        let output_start = Instant::now();
        output
            .write_frame(&ImageMessage::from_mask(seq, captured_at, mask))
            .context("Failed to write frame")?;
        stats.output_time += output_start.elapsed();
        stats.latency += captured_at.elapsed();

        stats.frames += 1;
        if stats.frames % STATS_EVERY == 0 {
            stats.log(frames.dropped());
        }
    }

    Ok(())
}
