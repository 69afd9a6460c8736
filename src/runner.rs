//! Headless frame loop shared by the binaries.

use std::f32::consts::TAU;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};

use crate::color::channels;
use crate::config::{Config, EffectKind, SyntheticAudio};
use crate::sound::{SoundEnvelope, SoundError, SoundSample, AUDIO_SAMPLE_LEN, MAX_CHANNELS};
use crate::state::{restore_state, save_state};
use crate::visual::{FxPipeline, IfsFx, TentacleFx, VisualFx};

pub const SYNTH_SAMPLE_RATE: u32 = 44_100;
const DEFAULT_SYNTH_FRAMES: u64 = 300;
const QUIET_FRAMES: u32 = 150;

/// Interleaved 16-bit PCM, at most two channels.
#[derive(Debug, Clone)]
pub struct WavAudio {
    pub sample_rate: u32,
    pub channels: usize,
    pub samples: Vec<i16>,
}

impl WavAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }

    pub fn duration_s(&self) -> f32 {
        self.frames() as f32 / self.sample_rate.max(1) as f32
    }
}

pub fn read_wav_pcm16(path: &Path) -> Result<WavAudio> {
    let bytes = fs::read(path)?;
    parse_wav_pcm16(&bytes)
}

/// Walks `id, size, body` records, skipping the pad byte after odd sizes. Stops at the first
/// truncated chunk.
struct RiffChunks<'a> {
    rest: &'a [u8],
}

impl<'a> RiffChunks<'a> {
    fn new(body: &'a [u8]) -> Self {
        Self { rest: body }
    }
}

impl<'a> Iterator for RiffChunks<'a> {
    type Item = ([u8; 4], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let (header, tail) = self.rest.split_at_checked(8)?;
        let id: [u8; 4] = header[..4].try_into().ok()?;
        let size = le_u32(&header[4..]) as usize;
        let Some(body) = tail.get(..size) else {
            self.rest = &[];
            return None;
        };
        self.rest = tail.get(size + size % 2..).unwrap_or(&[]);
        Some((id, body))
    }
}

fn le_u16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

struct WavFormat {
    audio_format: u16,
    num_channels: u16,
    sample_rate: u32,
    bits: u16,
}

impl WavFormat {
    fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < 16 {
            bail!("invalid fmt chunk");
        }
        Ok(Self {
            audio_format: le_u16(body),
            num_channels: le_u16(&body[2..]),
            sample_rate: le_u32(&body[4..]),
            bits: le_u16(&body[14..]),
        })
    }
}

/// Accepts PCM16 and Float32 WAV data; anything past the first two channels is dropped.
pub fn parse_wav_pcm16(bytes: &[u8]) -> Result<WavAudio> {
    if bytes.len() < 44 {
        bail!("wav too small");
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        bail!("not a RIFF/WAVE file");
    }

    let mut format = None;
    let mut data = None;
    for (id, body) in RiffChunks::new(&bytes[12..]) {
        match &id {
            b"fmt " => format = Some(WavFormat::parse(body)?),
            b"data" => data = Some(body),
            _ => {}
        }
    }

    let WavFormat {
        audio_format,
        num_channels,
        sample_rate,
        bits,
    } = format.context("missing fmt chunk")?;
    let data = data.context("missing data chunk")?;
    if num_channels == 0 {
        bail!("invalid channel count");
    }
    let ch = num_channels as usize;
    let keep = ch.min(MAX_CHANNELS);

    let samples: Vec<i16> = match (audio_format, bits) {
        (1, 16) => data
            .chunks_exact(2 * ch)
            .flat_map(|frame| {
                frame
                    .chunks_exact(2)
                    .take(keep)
                    .map(|b| i16::from_le_bytes([b[0], b[1]]))
            })
            .collect(),
        (3, 32) => data
            .chunks_exact(4 * ch)
            .flat_map(|frame| {
                frame.chunks_exact(4).take(keep).map(|b| {
                    let s = f32::from_le_bytes([b[0], b[1], b[2], b[3]]).clamp(-1.0, 1.0);
                    (s * i16::MAX as f32) as i16
                })
            })
            .collect(),
        _ => bail!(
            "unsupported wav format: audio_format={} bits={} (supported: PCM16, Float32)",
            audio_format,
            bits
        ),
    };

    Ok(WavAudio {
        sample_rate,
        channels: keep,
        samples,
    })
}

/// Produces one 512-sample block per video frame.
#[derive(Debug, Clone)]
pub enum AudioFeed {
    Synthetic { kind: SyntheticAudio, fps: u32 },
    Wav { audio: WavAudio, fps: u32 },
}

impl AudioFeed {
    pub fn natural_frames(&self) -> Option<u64> {
        match self {
            Self::Synthetic { .. } => None,
            Self::Wav { audio, fps } => Some((audio.duration_s() * *fps as f32).floor() as u64),
        }
    }

    pub fn block(&self, frame: u64) -> Result<SoundSample, SoundError> {
        match self {
            Self::Synthetic { kind, fps } => synth_block(*kind, *fps, frame),
            Self::Wav { audio, fps } => wav_block(audio, *fps, frame),
        }
    }
}

fn wav_block(audio: &WavAudio, fps: u32, frame: u64) -> Result<SoundSample, SoundError> {
    let ch = audio.channels.max(1);
    let start = (frame as f64 * audio.sample_rate as f64 / fps.max(1) as f64) as usize;
    let mut chans = vec![vec![0i16; AUDIO_SAMPLE_LEN]; ch];
    for i in 0..AUDIO_SAMPLE_LEN {
        let base = (start + i) * ch;
        for (c, chan) in chans.iter_mut().enumerate() {
            if let Some(&s) = audio.samples.get(base + c) {
                chan[i] = s;
            }
        }
    }
    SoundSample::new(chans)
}

fn synth_block(kind: SyntheticAudio, fps: u32, frame: u64) -> Result<SoundSample, SoundError> {
    let t0 = frame as f32 / fps.max(1) as f32;
    let dt = 1.0 / SYNTH_SAMPLE_RATE as f32;
    let mut left = vec![0i16; AUDIO_SAMPLE_LEN];
    let mut right = vec![0i16; AUDIO_SAMPLE_LEN];
    for i in 0..AUDIO_SAMPLE_LEN {
        let t = t0 + i as f32 * dt;
        let (l, r) = match kind {
            SyntheticAudio::Silence => (0.0, 0.0),
            SyntheticAudio::Pulse => {
                let beat = t % 0.5;
                let env = (-beat * 18.0).exp();
                let kick = (TAU * 60.0 * t).sin() * env;
                let hat = (TAU * 3_520.0 * t).sin() * 0.15;
                (0.85 * kick + hat, 0.85 * kick - hat)
            }
            SyntheticAudio::Sweep => {
                let amp = (0.05 + 0.02 * t).min(0.9);
                let freq = 80.0 + 40.0 * t;
                let s = amp * (TAU * freq * t).sin();
                (s, s * 0.8)
            }
        };
        left[i] = to_pcm(l);
        right[i] = to_pcm(r);
    }
    SoundSample::new(vec![left, right])
}

fn to_pcm(v: f32) -> i16 {
    (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Writes the frame as a binary PPM (P6); alpha is dropped.
pub fn write_ppm(path: &Path, width: usize, height: usize, pixels: &[u32]) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    write!(out, "P6\n{width} {height}\n255\n")?;
    for &px in pixels.iter().take(width * height) {
        let [r, g, b, _] = channels(px);
        out.write_all(&[r, g, b])?;
    }
    out.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub lit: usize,
    pub mean_luma: f32,
}

pub fn frame_stats(pixels: &[u32]) -> FrameStats {
    if pixels.is_empty() {
        return FrameStats::default();
    }
    let mut lit = 0usize;
    let mut luma = 0.0f64;
    for &px in pixels {
        let [r, g, b, _] = channels(px);
        if r | g | b != 0 {
            lit += 1;
        }
        luma += 0.2126 * r as f64 + 0.7152 * g as f64 + 0.0722 * b as f64;
    }
    FrameStats {
        lit,
        mean_luma: (luma / pixels.len() as f64) as f32,
    }
}

/// Decides effect visibility from the sound envelope.
///
/// A big goom toggles the fractal. The tentacles hide after a long stretch without gooms and
/// come back on the next one.
#[derive(Debug, Clone)]
pub struct SceneDirector {
    ifs_visible: bool,
    tentacles_visible: bool,
}

impl Default for SceneDirector {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneDirector {
    pub fn new() -> Self {
        Self {
            ifs_visible: true,
            tentacles_visible: true,
        }
    }

    pub fn ifs_visible(&self) -> bool {
        self.ifs_visible
    }

    pub fn tentacles_visible(&self) -> bool {
        self.tentacles_visible
    }

    /// Returns true when either flag changed.
    pub fn observe(&mut self, sound: &SoundEnvelope) -> bool {
        let before = (self.ifs_visible, self.tentacles_visible);
        if sound.is_big_goom() {
            self.ifs_visible = !self.ifs_visible;
        }
        if sound.is_goom() {
            self.tentacles_visible = true;
        } else if sound.time_since_last_goom() > QUIET_FRAMES {
            self.tentacles_visible = false;
        }
        before != (self.ifs_visible, self.tentacles_visible)
    }

    pub fn apply(&self, pipeline: &mut FxPipeline) {
        pipeline.set_visible(IfsFx::NAME, self.ifs_visible);
        pipeline.set_visible(TentacleFx::NAME, self.tentacles_visible);
    }
}

pub fn build_effects(kinds: &[EffectKind], tentacle_grids: usize) -> Vec<Box<dyn VisualFx>> {
    kinds
        .iter()
        .map(|k| -> Box<dyn VisualFx> {
            match k {
                EffectKind::Ifs => Box::new(IfsFx::new()),
                EffectKind::Tentacles => Box::new(TentacleFx::new(tentacle_grids)),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub gooms: u32,
    pub big_gooms: u32,
    pub lit_frames: u64,
    pub max_lit: usize,
}

pub fn run(cfg: Config) -> Result<RunSummary> {
    cfg.validate()?;

    let feed = match &cfg.wav {
        Some(path) => {
            let audio =
                read_wav_pcm16(path).with_context(|| format!("read wav {}", path.display()))?;
            if audio.samples.is_empty() {
                bail!("wav had no samples");
            }
            log::info!(
                "audio: {} ({} Hz, {} ch, {:.1}s)",
                path.display(),
                audio.sample_rate,
                audio.channels,
                audio.duration_s()
            );
            AudioFeed::Wav {
                audio,
                fps: cfg.fps,
            }
        }
        None => AudioFeed::Synthetic {
            kind: cfg.audio,
            fps: cfg.fps,
        },
    };
    let frames = cfg
        .frames
        .or_else(|| feed.natural_frames())
        .unwrap_or(DEFAULT_SYNTH_FRAMES);

    let effects = build_effects(&cfg.effects, cfg.tentacle_grids);
    let mut pipeline = FxPipeline::new(cfg.width, cfg.height, cfg.seed, effects)
        .context("initialise effect pipeline")?;

    if let Some(path) = &cfg.restore_state {
        restore_state(&mut pipeline, path)
            .with_context(|| format!("restore state from {}", path.display()))?;
    }

    let dump_dir = prepare_dump_dir(cfg.dump_frames.as_deref())?;
    let mut director = SceneDirector::new();
    let mut summary = RunSummary::default();
    let start_frame = pipeline.frame();
    let started = Instant::now();

    for i in 0..frames {
        let block = feed.block(start_frame + i)?;
        let frame = pipeline.process_frame(&block);
        let stats = frame_stats(frame);
        if stats.lit > 0 {
            summary.lit_frames += 1;
        }
        summary.max_lit = summary.max_lit.max(stats.lit);

        if let Some(dir) = &dump_dir {
            if i % cfg.dump_every == 0 {
                let path = dir.join(format!("frame_{:06}.ppm", start_frame + i));
                write_ppm(&path, cfg.width, cfg.height, frame)?;
            }
        }

        let sound = pipeline.sound();
        if sound.is_goom() {
            summary.gooms += 1;
        }
        if sound.is_big_goom() {
            summary.big_gooms += 1;
        }
        log::trace!(
            "frame {}: lit={} luma={:.2} vol={:.3} accel={:.3}",
            start_frame + i,
            stats.lit,
            stats.mean_luma,
            sound.volume(),
            sound.acceleration()
        );
        if director.observe(sound) {
            log::debug!(
                "frame {}: ifs={} tentacles={}",
                start_frame + i,
                director.ifs_visible(),
                director.tentacles_visible()
            );
            director.apply(&mut pipeline);
        }
        summary.frames += 1;
    }

    let elapsed = started.elapsed().as_secs_f32();
    log::info!(
        "rendered {} frames in {:.2}s ({:.1} fps), {} gooms, {} big gooms",
        summary.frames,
        elapsed,
        summary.frames as f32 / elapsed.max(1e-6),
        summary.gooms,
        summary.big_gooms
    );

    if let Some(path) = &cfg.save_state {
        save_state(&pipeline, path).with_context(|| format!("save state to {}", path.display()))?;
        log::info!("state saved to {}", path.display());
    }
    Ok(summary)
}

fn prepare_dump_dir(dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let Some(dir) = dir else {
        return Ok(None);
    };
    fs::create_dir_all(dir).with_context(|| format!("create dump directory {}", dir.display()))?;
    Ok(Some(dir.to_path_buf()))
}
