use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;

use crate::visual::tentacles::DEFAULT_NUM_GRIDS;

pub const DEFAULT_SEED: u64 = 0x6007_F00D;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "goom_fx",
    version,
    about = "Headless goom-style audio-reactive effects (IFS fractal + 3D tentacles)"
)]
pub struct Config {
    #[arg(long, default_value_t = 640)]
    pub width: usize,

    #[arg(long, default_value_t = 480)]
    pub height: usize,

    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// Frames to render; defaults to the length of the WAV, or 300 for synthetic audio.
    #[arg(long)]
    pub frames: Option<u64>,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = [EffectKind::Ifs, EffectKind::Tentacles]
    )]
    pub effects: Vec<EffectKind>,

    #[arg(long, value_enum, default_value_t = SyntheticAudio::Pulse)]
    pub audio: SyntheticAudio,

    #[arg(long, value_name = "WAV")]
    pub wav: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub dump_frames: Option<PathBuf>,

    #[arg(long, default_value_t = 1)]
    pub dump_every: u64,

    #[arg(long, value_name = "PATH")]
    pub save_state: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub restore_state: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_NUM_GRIDS)]
    pub tentacle_grids: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EffectKind {
    #[value(alias = "fractal")]
    Ifs,
    #[value(alias = "tentacle")]
    Tentacles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SyntheticAudio {
    /// Beat-like bursts every half second.
    Pulse,
    /// A rising tone with slowly growing amplitude.
    Sweep,
    Silence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroSize { width: usize, height: usize },
    ZeroFps,
    ZeroDumpEvery,
    NoEffects,
    NoTentacleGrids,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroSize { width, height } => {
                write!(f, "frame size must be at least 1x1, got {width}x{height}")
            }
            Self::ZeroFps => write!(f, "--fps must be >= 1"),
            Self::ZeroDumpEvery => write!(f, "--dump-every must be >= 1"),
            Self::NoEffects => write!(f, "--effects needs at least one effect"),
            Self::NoTentacleGrids => write!(f, "--tentacle-grids must be >= 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ZeroSize {
                width: self.width,
                height: self.height,
            });
        }
        if self.fps == 0 {
            return Err(ConfigError::ZeroFps);
        }
        if self.dump_every == 0 {
            return Err(ConfigError::ZeroDumpEvery);
        }
        if self.effects.is_empty() {
            return Err(ConfigError::NoEffects);
        }
        if self.effects.contains(&EffectKind::Tentacles) && self.tentacle_grids == 0 {
            return Err(ConfigError::NoTentacleGrids);
        }
        Ok(())
    }
}
