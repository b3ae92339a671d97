use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use image::RgbImage;
use retouch_core::{
    retouch, LandmarkDetector, LandmarkSet, MakeupParams, Point, RetouchOptions, RetouchStrategy,
    SlimParams, SmoothingParams,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "retouch", about = "Landmark-driven face retouching CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    /// Local patch warps: eye enlargement + lower-face slim
    LocalPatch,
    /// Global triangulated mesh warp
    Mesh,
    /// Mesh warp with an external pre-enhancement pass (if wired in)
    PreEnhancedMesh,
}

impl From<Strategy> for RetouchStrategy {
    fn from(s: Strategy) -> Self {
        match s {
            Strategy::LocalPatch => RetouchStrategy::LocalPatch,
            Strategy::Mesh => RetouchStrategy::MeshWarp,
            Strategy::PreEnhancedMesh => RetouchStrategy::PreEnhancedMesh,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Retouch an image using a landmark file from an external detector
    Run {
        /// Input image (PNG/JPEG)
        image: PathBuf,
        /// Output image path
        output: PathBuf,
        /// Landmark JSON file: an array of [x, y] pixel coordinates
        #[arg(short, long)]
        landmarks: PathBuf,
        #[arg(long, value_enum, default_value_t = Strategy::LocalPatch)]
        strategy: Strategy,
        /// Eye enlargement factor
        #[arg(long, default_value_t = 1.20)]
        eye_scale: f32,
        /// Lower-face horizontal squeeze factor
        #[arg(long, default_value_t = 0.85)]
        slim_scale: f32,
        /// Skin smoothing strength in [0, 1]
        #[arg(long, default_value_t = 0.5)]
        smooth_strength: f32,
        /// Skip the makeup overlays
        #[arg(long)]
        no_makeup: bool,
    },
    /// Validate and stabilize a landmark file, reporting what would change
    Check {
        /// Landmark JSON file
        landmarks: PathBuf,
    },
}

/// Detector that serves a landmark set parsed from a file. The re-detection
/// pass receives the same set; callers with a live detector get true
/// re-detection through the same trait.
struct FileLandmarks {
    set: LandmarkSet,
}

impl LandmarkDetector for FileLandmarks {
    fn detect(&self, _image: &RgbImage) -> Option<LandmarkSet> {
        Some(self.set.clone())
    }
}

fn load_landmarks(path: &Path) -> Result<LandmarkSet> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading landmark file {}", path.display()))?;
    let pairs: Vec<(f32, f32)> = serde_json::from_str(&text)
        .with_context(|| format!("parsing landmark file {}", path.display()))?;
    Ok(LandmarkSet::new(
        pairs.into_iter().map(|(x, y)| Point::new(x, y)).collect(),
    ))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            image,
            output,
            landmarks,
            strategy,
            eye_scale,
            slim_scale,
            smooth_strength,
            no_makeup,
        } => {
            let img = image::open(&image)
                .with_context(|| format!("opening {}", image.display()))?
                .to_rgb8();
            let set = load_landmarks(&landmarks)?;
            tracing::info!(
                width = img.width(),
                height = img.height(),
                landmarks = set.len(),
                "loaded inputs"
            );

            let detector = FileLandmarks { set };
            let options = RetouchOptions {
                strategy: strategy.into(),
                eye_scale,
                slim: SlimParams {
                    horizontal_scale: slim_scale,
                    ..SlimParams::default()
                },
                smoothing: SmoothingParams {
                    strength: smooth_strength,
                    ..SmoothingParams::default()
                },
                makeup: if no_makeup {
                    MakeupParams {
                        lip: None,
                        blush: None,
                        highlight: None,
                    }
                } else {
                    MakeupParams::default()
                },
                ..RetouchOptions::default()
            };

            let out = retouch(&img, &detector, None, &options);
            out.save(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("wrote {}", output.display());
        }
        Commands::Check { landmarks } => {
            let set = load_landmarks(&landmarks)?;
            match retouch_core::landmarks::validate(&set, retouch_core::regions::LANDMARK_COUNT) {
                Ok(()) => {
                    let options = RetouchOptions::default();
                    let stabilized =
                        retouch_core::landmarks::stabilize(&set, options.stabilize_threshold_px);
                    let moved = set
                        .points()
                        .iter()
                        .zip(stabilized.points())
                        .filter(|(a, b)| a != b)
                        .count();
                    println!("ok: {} landmarks, {moved} corrected by the stabilizer", set.len());
                }
                Err(e) => {
                    println!("rejected: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
