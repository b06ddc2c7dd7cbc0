//! Command-line interface for the scene detection library
//!
//! `scenecut detect` prints the scenes of a video, `scenecut info` shows the
//! stream properties and `scenecut benchmark` scores stored detection results
//! against annotated cut lists.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, ensure, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info, warn};

use scenecut::benchmark::{self, SceneFileResult};
use scenecut::{
    available_detectors, create_detector, detect, get_video_info, init_tracing, ContentConfig,
    ContentDetector, Detector, Scene, ThresholdConfig, ThresholdDetector, TimecodeFormat,
};

#[derive(Parser, Debug)]
#[command(name = "scenecut", version)]
#[command(about = "Find cuts and fades in video files", long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect scenes in a video file
    Detect(DetectArgs),
    /// Show video information only
    Info {
        video_path: PathBuf,
    },
    /// Score detection results against ground truth annotations
    Benchmark {
        /// JSON file mapping scene file names to `{ pred_scenes, elapsed }`
        #[arg(long)]
        results: PathBuf,

        /// Directory holding one `<scene file stem>.txt` annotation per video
        #[arg(long)]
        annotations: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct DetectArgs {
    video_path: PathBuf,

    /// Detection algorithm
    #[arg(short, long, default_value = "content")]
    detector: String,

    /// Detection threshold (content score, or pixel intensity for `threshold`)
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Minimum frames between cuts
    #[arg(long)]
    min_scene_len: Option<u64>,

    /// Where to place a fade cut, from -1 (fade out) to 1 (fade in)
    #[arg(long, allow_negative_numbers = true)]
    fade_bias: Option<f64>,

    /// Add a cut when the video ends faded out
    #[arg(long)]
    add_final_scene: bool,

    /// Use only brightness changes (ignore color)
    #[arg(long)]
    luma_only: bool,

    /// Stats file to reuse and update with per-frame metrics
    #[arg(short, long)]
    stats: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Simple)]
    format: OutputFormat,

    /// How scene boundaries are printed: frames, seconds or timecode
    #[arg(long, default_value = "timecode")]
    timecode_format: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    /// Cut frame numbers only
    Simple,
    /// One line per scene with start, end and length
    Detailed,
    /// JSON for programmatic consumption
    Json,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    init_tracing(log_level);

    info!("scenecut v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match args.command {
        Commands::Detect(detect_args) => run_detect(&detect_args),
        Commands::Info { video_path } => show_video_info(&video_path),
        Commands::Benchmark {
            results,
            annotations,
        } => run_benchmark(&results, &annotations),
    }
}

fn build_detector(args: &DetectArgs) -> Result<Detector> {
    let detector = match create_detector(&args.detector) {
        Ok(detector) => detector,
        Err(_) => bail!(
            "Unknown detector '{}', expected one of: {}",
            args.detector,
            available_detectors().collect::<Vec<_>>().join(", ")
        ),
    };

    let detector = match detector {
        Detector::Content(_) => {
            let mut config = ContentConfig::default();
            if let Some(threshold) = args.threshold {
                config = config.threshold(threshold);
            }
            if let Some(min_scene_len) = args.min_scene_len {
                config = config.min_scene_len(min_scene_len);
            }
            if args.luma_only {
                config = config.luma_only();
            }
            if args.fade_bias.is_some() || args.add_final_scene {
                warn!("--fade-bias and --add-final-scene only apply to the threshold detector");
            }
            ContentDetector::new(config)
                .context("Invalid content detector settings")?
                .into()
        }
        Detector::Threshold(_) => {
            let mut config = ThresholdConfig::default().add_final_scene(args.add_final_scene);
            if let Some(threshold) = args.threshold {
                ensure!(
                    (0.0..=255.0).contains(&threshold),
                    "Threshold detector threshold must be within 0-255, got {}",
                    threshold
                );
                config = config.threshold(threshold as u8);
            }
            if let Some(min_scene_len) = args.min_scene_len {
                config = config.min_scene_len(min_scene_len);
            }
            if let Some(fade_bias) = args.fade_bias {
                config = config.fade_bias(fade_bias);
            }
            if args.luma_only {
                warn!("--luma-only only applies to the content detector");
            }
            ThresholdDetector::new(config)
                .context("Invalid threshold detector settings")?
                .into()
        }
    };
    Ok(detector)
}

fn run_detect(args: &DetectArgs) -> Result<()> {
    let timecode_format = TimecodeFormat::from_name(&args.timecode_format).with_context(|| {
        format!(
            "Unknown timecode format '{}', expected one of: {}",
            args.timecode_format,
            TimecodeFormat::available().collect::<Vec<_>>().join(", ")
        )
    })?;
    let detector = build_detector(args)?;
    let video_path = path_str(&args.video_path)?;

    let start_time = Instant::now();
    let scenes = detect(video_path, detector, args.stats.as_deref())
        .with_context(|| format!("Scene detection failed for {}", video_path))?;
    let detection_time = start_time.elapsed();

    output_results(&scenes, args, timecode_format, detection_time)
}

fn show_video_info(video_path: &Path) -> Result<()> {
    let video_path = path_str(video_path)?;
    info!("Analyzing video: {}", video_path);

    let video_info = get_video_info(video_path).context("Failed to get video info")?;

    println!("Video Information:");
    println!("  Path: {}", video_info.path);
    println!("  Dimensions: {}x{}", video_info.width, video_info.height);
    println!("  Frame Rate: {:.3} fps", video_info.fps);
    println!("  Frame Count: {}", video_info.frame_count);
    println!("  Duration: {}", video_info.duration());
    println!("  Description: {}", video_info.description());

    if !video_info.is_valid() {
        warn!("Video properties appear invalid - detection may fail");
    }
    Ok(())
}

fn output_results(
    scenes: &[Scene],
    args: &DetectArgs,
    timecode_format: TimecodeFormat,
    detection_time: Duration,
) -> Result<()> {
    let cuts: Vec<u64> = scenes.iter().skip(1).map(Scene::start_frame).collect();

    match args.format {
        OutputFormat::Simple => {
            println!("Scene changes detected at frames: {:?}", cuts);
        }
        OutputFormat::Detailed => {
            println!("Scene Detection Results:");
            println!("  Detection time: {}ms", detection_time.as_millis());
            println!("  Scenes found: {}", scenes.len());
            for (i, scene) in scenes.iter().enumerate() {
                println!(
                    "    Scene {}: {} - {} ({} frames)",
                    i + 1,
                    scene.start_timecode().render(timecode_format),
                    scene.end_timecode().render(timecode_format),
                    scene.duration_frames()
                );
            }
        }
        OutputFormat::Json => {
            let scene_list: Vec<_> = scenes
                .iter()
                .map(|scene| {
                    serde_json::json!({
                        "start_frame": scene.start_frame(),
                        "end_frame": scene.end_frame(),
                        "start": scene.start_timecode().render(timecode_format),
                        "end": scene.end_timecode().render(timecode_format),
                    })
                })
                .collect();
            let json_output = serde_json::json!({
                "video_path": args.video_path,
                "detector": args.detector,
                "detection_time_ms": detection_time.as_millis() as u64,
                "cuts": cuts,
                "scenes": scene_list,
            });
            println!("{}", serde_json::to_string_pretty(&json_output)?);
        }
    }

    info!(
        "Detection completed in {}ms, found {} scenes",
        detection_time.as_millis(),
        scenes.len()
    );
    Ok(())
}

fn run_benchmark(results_path: &Path, annotations: &Path) -> Result<()> {
    let json = fs::read_to_string(results_path)
        .with_context(|| format!("Failed to read {}", results_path.display()))?;
    let results: BTreeMap<String, SceneFileResult> = benchmark::parse_results(&json)
        .with_context(|| format!("Failed to parse {}", results_path.display()))?;

    let mut ground_truths = BTreeMap::new();
    for name in results.keys() {
        let stem = Path::new(name)
            .file_stem()
            .with_context(|| format!("Scene file '{}' has no file name", name))?;
        let annotation_path = annotations.join(format!("{}.txt", stem.to_string_lossy()));
        if !annotation_path.exists() {
            continue;
        }
        let text = fs::read_to_string(&annotation_path)
            .with_context(|| format!("Failed to read {}", annotation_path.display()))?;
        let frames = benchmark::parse_ground_truth(&text)
            .with_context(|| format!("Failed to parse {}", annotation_path.display()))?;
        ground_truths.insert(name.clone(), frames);
    }

    let summary = benchmark::evaluate_all(&results, &ground_truths);
    for (name, evaluation) in &summary.per_file {
        println!(
            "{}: recall={:.3} precision={:.3} f1={:.3}",
            name, evaluation.recall, evaluation.precision, evaluation.f1
        );
    }
    println!(
        "Overall ({} files): recall={:.3} precision={:.3} f1={:.3} mean elapsed={:.3}s",
        summary.per_file.len(),
        summary.overall.recall,
        summary.overall.precision,
        summary.overall.f1,
        summary.mean_elapsed
    );
    Ok(())
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("Path is not valid UTF-8: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_detect(argv: &[&str]) -> DetectArgs {
        let args = Args::try_parse_from(argv).unwrap();
        match args.command {
            Commands::Detect(detect_args) => detect_args,
            other => panic!("Expected detect command, got: {:?}", other),
        }
    }

    #[test]
    fn test_detect_defaults() {
        let args = parse_detect(&["scenecut", "detect", "video.mp4"]);
        assert_eq!(args.detector, "content");
        assert_eq!(args.format, OutputFormat::Simple);
        assert_eq!(args.threshold, None);
        assert!(!args.luma_only);

        let detector = build_detector(&args).unwrap();
        assert_eq!(detector.name(), "content");
    }

    #[test]
    fn test_threshold_detector_settings() {
        let args = parse_detect(&[
            "scenecut",
            "detect",
            "video.mp4",
            "--detector",
            "threshold",
            "--threshold",
            "20",
            "--fade-bias",
            "-0.5",
            "--add-final-scene",
            "--format",
            "json",
        ]);
        assert_eq!(args.fade_bias, Some(-0.5));
        assert_eq!(args.format, OutputFormat::Json);

        match build_detector(&args).unwrap() {
            Detector::Threshold(detector) => {
                assert_eq!(detector.config().threshold, 20);
                assert_eq!(detector.config().fade_bias, -0.5);
                assert!(detector.config().add_final_scene);
            }
            other => panic!("Expected threshold detector, got: {:?}", other),
        }
    }

    #[test]
    fn test_bad_detector_settings() {
        let args = parse_detect(&["scenecut", "detect", "v.mp4", "--detector", "motion"]);
        assert!(build_detector(&args).is_err());

        let args = parse_detect(&[
            "scenecut",
            "detect",
            "v.mp4",
            "--detector",
            "threshold",
            "--threshold",
            "300",
        ]);
        assert!(build_detector(&args).is_err());

        let args = parse_detect(&["scenecut", "detect", "v.mp4", "--min-scene-len", "0"]);
        assert!(build_detector(&args).is_err());
    }

    #[test]
    fn test_benchmark_command() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results.json");
        fs::write(
            &results,
            r#"{ "clip.mp4": { "pred_scenes": [9, 19], "elapsed": 0.5 } }"#,
        )
        .unwrap();
        fs::write(dir.path().join("clip.txt"), "1\t10\n2\t30\n").unwrap();

        run_benchmark(&results, dir.path()).unwrap();
        assert!(run_benchmark(&dir.path().join("missing.json"), dir.path()).is_err());
    }
}
