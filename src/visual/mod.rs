pub mod fixed;
pub mod grid;
pub mod ifs;
pub mod tentacles;

use crate::color::{channels, from_channels};
use crate::rand::GoomRand;
use crate::sound::{SoundEnvelope, SoundSample};
use crate::state::{Persist, StateError, StateReader, StateWriter};
use grid::GridError;
use std::fmt;

pub use ifs::IfsFx;
pub use tentacles::TentacleFx;

/// Per-frame inputs shared by every effect.
pub struct FxCtx<'a> {
    pub sound: &'a SoundEnvelope,
    pub sample: &'a SoundSample,
    pub rand: &'a mut GoomRand,
    pub visible: bool,
}

/// A visual effect drawing into the frame pair.
///
/// `src` is the back buffer: the faded trail that the next frame fades again, so strokes
/// written there persist. `dst` is the front buffer shown this frame, starting as a copy of
/// `src`; strokes written only there last one frame.
pub trait VisualFx {
    fn name(&self) -> &'static str;

    fn init(&mut self, width: usize, height: usize, rand: &mut GoomRand) -> Result<(), FxError>;

    fn apply(&mut self, ctx: &mut FxCtx<'_>, src: &mut [u32], dst: &mut [u32]);

    /// Releases large allocations. `init` must be called again before the next `apply`.
    fn free(&mut self) {}

    fn save(&self, _w: &mut StateWriter) {}

    fn restore(&mut self, _r: &StateReader) -> Result<(), StateError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FxError {
    Grid(GridError),
    BufferSize { expected: usize, got: usize },
}

impl fmt::Display for FxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grid(e) => write!(f, "grid setup failed: {e}"),
            Self::BufferSize { expected, got } => {
                write!(f, "frame buffer holds {got} pixels, expected {expected}")
            }
        }
    }
}

impl std::error::Error for FxError {}

impl From<GridError> for FxError {
    fn from(e: GridError) -> Self {
        Self::Grid(e)
    }
}

/// Fades every channel to 7/8 of its value so old strokes leave trails.
#[inline]
pub fn fade_pixel(c: u32) -> u32 {
    from_channels(channels(c).map(|v| v - (v >> 3)))
}

/// Owns the trail and output buffers, the sound envelope and the effect stack.
pub struct FxPipeline {
    width: usize,
    height: usize,
    rand: GoomRand,
    sound: SoundEnvelope,
    effects: Vec<Box<dyn VisualFx>>,
    visible: Vec<bool>,
    frame: u64,
    trail: Vec<u32>,
    out: Vec<u32>,
}

impl FxPipeline {
    pub fn new(
        width: usize,
        height: usize,
        seed: u64,
        mut effects: Vec<Box<dyn VisualFx>>,
    ) -> Result<Self, FxError> {
        let mut rand = GoomRand::new(seed);
        for fx in &mut effects {
            fx.init(width, height, &mut rand)?;
            log::debug!("pipeline: {} ready at {width}x{height}", fx.name());
        }
        log::info!(
            "pipeline: {} effect(s) at {width}x{height}, seed {seed:#x}",
            effects.len()
        );
        let visible = vec![true; effects.len()];
        Ok(Self {
            width,
            height,
            rand,
            sound: SoundEnvelope::new(),
            effects,
            visible,
            frame: 0,
            trail: vec![0; width * height],
            out: vec![0; width * height],
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn sound(&self) -> &SoundEnvelope {
        &self.sound
    }

    pub fn rand(&self) -> &GoomRand {
        &self.rand
    }

    pub fn effect_names(&self) -> Vec<&'static str> {
        self.effects.iter().map(|fx| fx.name()).collect()
    }

    /// The most recent output frame.
    pub fn output(&self) -> &[u32] {
        &self.out
    }

    /// Returns false when no effect has that name.
    pub fn set_visible(&mut self, name: &str, visible: bool) -> bool {
        let mut found = false;
        for (fx, v) in self.effects.iter().zip(self.visible.iter_mut()) {
            if fx.name() == name {
                if *v != visible {
                    log::debug!("pipeline: {name} visible={visible}");
                }
                *v = visible;
                found = true;
            }
        }
        found
    }

    pub fn is_visible(&self, name: &str) -> Option<bool> {
        self.effects
            .iter()
            .zip(&self.visible)
            .find(|(fx, _)| fx.name() == name)
            .map(|(_, &v)| v)
    }

    /// Feeds one audio block through the envelope and every effect; returns the new frame.
    pub fn process_frame(&mut self, sample: &SoundSample) -> &[u32] {
        self.sound.process_sample(sample);
        if self.sound.is_big_goom() {
            log::debug!("pipeline: big goom at frame {}", self.frame);
        }

        for (o, t) in self.out.iter_mut().zip(self.trail.iter_mut()) {
            *t = fade_pixel(*t);
            *o = *t;
        }
        for (fx, &visible) in self.effects.iter_mut().zip(&self.visible) {
            let mut ctx = FxCtx {
                sound: &self.sound,
                sample,
                rand: &mut self.rand,
                visible,
            };
            fx.apply(&mut ctx, &mut self.trail, &mut self.out);
        }

        self.frame += 1;
        &self.out
    }

    /// Like [`FxPipeline::process_frame`] but copies the frame into a caller buffer.
    pub fn render_into(&mut self, sample: &SoundSample, out: &mut [u32]) -> Result<(), FxError> {
        let expected = self.width * self.height;
        if out.len() != expected {
            return Err(FxError::BufferSize {
                expected,
                got: out.len(),
            });
        }
        out.copy_from_slice(self.process_frame(sample));
        Ok(())
    }
}

impl Drop for FxPipeline {
    fn drop(&mut self) {
        for fx in &mut self.effects {
            fx.free();
        }
    }
}

impl Persist for FxPipeline {
    fn save(&self, w: &mut StateWriter) {
        w.section("pipeline");
        w.put("width", self.width);
        w.put("height", self.height);
        w.put("seed", self.rand.seed());
        w.put("rand", self.rand.state());
        w.put("frame", self.frame);
        w.put("effects", self.effect_names().join(","));
        for (i, v) in self.visible.iter().enumerate() {
            w.put_indexed("visible", i, v);
        }
        self.sound.save(w);
        for fx in &self.effects {
            fx.save(w);
        }
    }

    fn restore(&mut self, r: &StateReader) -> Result<(), StateError> {
        let p = r.scoped("pipeline");
        for (key, have) in [("width", self.width), ("height", self.height)] {
            let saved: usize = p.get(key)?;
            if saved != have {
                return Err(StateError::Mismatch {
                    key: format!("pipeline.{key}"),
                    message: format!("state was saved at {saved}, pipeline has {have}"),
                });
            }
        }
        let names: String = p.get("effects")?;
        let have = self.effect_names().join(",");
        if names != have {
            return Err(StateError::Mismatch {
                key: "pipeline.effects".to_string(),
                message: format!("state has [{names}], pipeline has [{have}]"),
            });
        }

        let seed: u64 = p.get("seed")?;
        let state: u64 = p.get("rand")?;
        self.rand.reseed(seed);
        self.rand.restore_state(state);
        self.frame = p.get("frame")?;
        for i in 0..self.visible.len() {
            self.visible[i] = p.get_bool(&format!("visible[{i}]"))?;
        }
        self.sound.restore(r)?;
        for fx in &mut self.effects {
            fx.restore(r)?;
        }
        log::info!("pipeline: restored state at frame {}", self.frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_keeps_seven_eighths() {
        assert_eq!(fade_pixel(0x0808_0808), 0x0707_0707);
        assert_eq!(fade_pixel(0x0000_00ff), 0x0000_00e0);
        assert_eq!(fade_pixel(0x0000_0007), 0x0000_0007);
    }

    #[test]
    fn render_into_checks_length() {
        let mut p = FxPipeline::new(4, 4, 1, Vec::new()).expect("pipeline");
        let silence = SoundSample::silence(2).expect("silence");
        let mut out = vec![0u32; 3];
        assert_eq!(
            p.render_into(&silence, &mut out),
            Err(FxError::BufferSize { expected: 16, got: 3 })
        );
    }
}
