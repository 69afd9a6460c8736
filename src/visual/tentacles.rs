use super::grid::{Grid3D, GridError, TentacleColorer, V3d};
use super::{FxCtx, FxError, VisualFx};
use crate::color::{evolve_color_all, lighten_color, pack, ColorGroup, ColorMaps};
use crate::draw::AntialiasedLine;
use crate::rand::GoomRand;
use crate::sound::AUDIO_SAMPLE_LEN;
use crate::state::{StateError, StateReader, StateScope, StateWriter};
use std::f32::consts::{FRAC_PI_2, PI, TAU};
use std::rc::Rc;

pub const DEFAULT_NUM_GRIDS: usize = 6;

const DEFINITION_X: usize = 15;
const DEFINITION_Z: usize = 45;
const CENTER_Y_START: f32 = -17.0;
const CENTER_Y_STEP: f32 = 8.0;

const LIG_START: f32 = 1.15;
const LIGS_START: f32 = 0.1;
const LIG_RETRACT: f32 = 1.01;
const LIG_CEIL: f32 = 10.0;
const LIG_FLOOR: f32 = 1.1;
const LIG_COLOR_CHANGE: f32 = 6.3;
const MAX_RAPPORT: f32 = 1.12;

const EVENT_MIN_FRAMES: u32 = 100;
const EVENT_EXTRA_FRAMES: u32 = 60;

/// Camera distance and rotation for the tentacle field, with occasional faster "events".
#[derive(Debug, Clone, PartialEq)]
pub struct PrettyMove {
    happens: u32,
    lock: u32,
    rotation: bool,
    distt: f32,
    distt2: f32,
    rot: f32,
}

impl Default for PrettyMove {
    fn default() -> Self {
        Self {
            happens: 0,
            lock: 0,
            rotation: false,
            distt: 10.0,
            distt2: 0.0,
            rot: 0.0,
        }
    }
}

impl PrettyMove {
    /// Advances one frame. Returns true when a new camera event starts.
    pub fn step(&mut self, cycle: f32, rand: &mut GoomRand) -> bool {
        let mut started = false;
        if self.happens > 0 {
            self.happens -= 1;
        } else if self.lock == 0 {
            if !rand.probability_of_m_in_n(199, 200) {
                self.happens = EVENT_MIN_FRAMES + rand.next_u32_in_range(EVENT_EXTRA_FRAMES + 1);
                self.lock = self.happens * 3 / 2;
                started = true;
            }
        } else {
            self.lock -= 1;
        }

        let target2 = if self.happens > 0 { 8.0 } else { 0.0 };
        self.distt2 = (target2 + 15.0 * self.distt2) / 16.0;

        let mut target = 30.0 + 256.0 - 90.0 * (1.0 + (cycle * 19.0 / 20.0).sin());
        if self.happens > 0 {
            target *= 0.6;
        }
        self.distt = (target + 3.0 * self.distt) / 4.0;

        let rot_target = if self.happens == 0 {
            PI * cycle.sin() / 32.0 + 3.0 * FRAC_PI_2
        } else {
            if rand.probability_of_m_in_n(1, 500) {
                self.rotation = rand.coin();
            }
            let c = if self.rotation { cycle * TAU } else { cycle * -PI };
            c.rem_euclid(TAU)
        };
        self.rot = blend_angle(self.rot, rot_target);
        started
    }

    pub fn happens(&self) -> u32 {
        self.happens
    }

    pub fn lock(&self) -> u32 {
        self.lock
    }

    pub fn distt(&self) -> f32 {
        self.distt
    }

    pub fn distt2(&self) -> f32 {
        self.distt2
    }

    pub fn rot(&self) -> f32 {
        self.rot
    }

    fn save(&self, w: &mut StateWriter) {
        w.put("happens", self.happens);
        w.put("lock", self.lock);
        w.put("rotation", self.rotation);
        w.put("distt", self.distt);
        w.put("distt2", self.distt2);
        w.put("rot", self.rot);
    }

    fn restore(&mut self, r: &StateScope<'_>) -> Result<(), StateError> {
        self.happens = r.get("happens")?;
        self.lock = r.get("lock")?;
        self.rotation = r.get_bool("rotation")?;
        self.distt = r.get("distt")?;
        self.distt2 = r.get("distt2")?;
        self.rot = r.get("rot")?;
        Ok(())
    }
}

/// Moves `rot` a sixteenth of the way toward `target` along the shorter arc; the result is
/// wrapped into `[0, 2π)`.
pub fn blend_angle(rot: f32, target: f32) -> f32 {
    let nearest = [rot, rot + TAU, rot - TAU]
        .into_iter()
        .min_by(|a, b| (a - target).abs().total_cmp(&(b - target).abs()))
        .unwrap_or(rot);
    let r = ((target + 15.0 * nearest) / 16.0).rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if r >= TAU { 0.0 } else { r }
}

/// Amplitude modulator for the base-row heights.
#[derive(Debug, Clone, PartialEq)]
pub struct SineOscillator {
    frequency: f32,
    phase: f32,
    min: f32,
    max: f32,
}

impl SineOscillator {
    pub const MIN_FREQUENCY: f32 = 0.25;
    pub const MAX_FREQUENCY: f32 = 4.0;
    const BASE_STEP: f32 = 0.1;

    pub fn new(min: f32, max: f32) -> Self {
        Self {
            frequency: 1.0,
            phase: 0.0,
            min,
            max,
        }
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn set_frequency(&mut self, f: f32) {
        self.frequency = f.clamp(Self::MIN_FREQUENCY, Self::MAX_FREQUENCY);
    }

    pub fn next_value(&mut self) -> f32 {
        let v = self.min + (self.max - self.min) * (0.5 + 0.5 * self.phase.sin());
        self.phase = (self.phase + Self::BASE_STEP * self.frequency).rem_euclid(TAU);
        v
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Rising,
    Falling,
}

/// Reports a trend once a signal has moved the same way by more than `threshold` for
/// `run_len` frames in a row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeTracker {
    threshold: f32,
    run_len: u32,
    last: Option<f32>,
    rising: u32,
    falling: u32,
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new(0.01, 10)
    }
}

impl ChangeTracker {
    pub fn new(threshold: f32, run_len: u32) -> Self {
        Self {
            threshold,
            run_len,
            last: None,
            rising: 0,
            falling: 0,
        }
    }

    pub fn observe(&mut self, value: f32) -> Option<Trend> {
        let last = self.last.replace(value)?;
        let delta = value - last;
        if delta > self.threshold {
            self.rising += 1;
            self.falling = 0;
        } else if delta < -self.threshold {
            self.falling += 1;
            self.rising = 0;
        } else {
            self.rising = 0;
            self.falling = 0;
        }

        if self.rising >= self.run_len {
            self.rising = 0;
            Some(Trend::Rising)
        } else if self.falling >= self.run_len {
            self.falling = 0;
            Some(Trend::Falling)
        } else {
            None
        }
    }
}

struct Tentacle {
    grid: Grid3D,
    colorer: TentacleColorer,
    vals: Vec<f32>,
}

/// A field of 3D tentacles driven by the sound envelope.
pub struct TentacleFx {
    num_grids: usize,
    width: usize,
    height: usize,
    tentacles: Vec<Tentacle>,
    maps: ColorMaps,
    dominant: Option<Rc<dyn ColorGroup>>,
    line: AntialiasedLine,
    mover: PrettyMove,
    oscillator: SineOscillator,
    tracker: ChangeTracker,
    cycle: f32,
    lig: f32,
    ligs: f32,
    col: u32,
    dstcol: u32,
    rapport: f32,
}

impl TentacleFx {
    pub const NAME: &'static str = "tentacles";

    pub fn new(num_grids: usize) -> Self {
        Self {
            num_grids,
            width: 0,
            height: 0,
            tentacles: Vec::new(),
            maps: ColorMaps::new(),
            dominant: None,
            line: AntialiasedLine::new(0, 0),
            mover: PrettyMove::default(),
            oscillator: SineOscillator::new(0.5, 1.5),
            tracker: ChangeTracker::default(),
            cycle: 0.0,
            lig: LIG_START,
            ligs: LIGS_START,
            col: pack(0x28, 0x1c, 0x0a, 0x00),
            dstcol: 0,
            rapport: 1.0,
        }
    }

    pub fn num_grids(&self) -> usize {
        self.tentacles.len()
    }

    pub fn grid(&self, i: usize) -> Option<&Grid3D> {
        self.tentacles.get(i).map(|t| &t.grid)
    }

    pub fn mover(&self) -> &PrettyMove {
        &self.mover
    }

    pub fn oscillator(&self) -> &SineOscillator {
        &self.oscillator
    }

    pub fn lig(&self) -> f32 {
        self.lig
    }

    pub fn cycle(&self) -> f32 {
        self.cycle
    }

    pub fn color(&self) -> u32 {
        self.col
    }

    pub fn destination_color(&self) -> u32 {
        self.dstcol
    }

    fn build_tentacle(
        index: usize,
        group: Rc<dyn ColorGroup>,
        rand: &mut GoomRand,
    ) -> Result<Tentacle, GridError> {
        let depth = 45.0 + rand.next_u32_in_range(30) as f32;
        let width = 85.0 + rand.next_u32_in_range(5) as f32;
        let taper = rand.range_f32(0.5, 0.9);
        let num_z = DEFINITION_Z + rand.next_u32_in_range(10) as usize;
        let center = V3d::new(0.0, CENTER_Y_START + CENTER_Y_STEP * index as f32, depth);

        let mid = (DEFINITION_X - 1) as f32 / 2.0;
        let creep = rand.range_f32(0.1, 0.4);
        let mins = vec![-depth / 2.0; DEFINITION_X];
        let maxs: Vec<f32> = (0..DEFINITION_X)
            .map(|nx| {
                let off = (nx as f32 - mid) / mid;
                depth / 2.0 + depth * creep * off * off
            })
            .collect();

        let grid = Grid3D::new(center, width * taper, width, DEFINITION_X, &mins, &maxs, num_z)?;
        log::debug!(
            "tentacles: grid {index} {DEFINITION_X}x{num_z}, width {width}, depth {depth}"
        );
        Ok(Tentacle {
            grid,
            colorer: TentacleColorer::new(group, pack(8, 4, 4, 0), pack(2, 1, 1, 0)),
            vals: vec![0.0; DEFINITION_X],
        })
    }

    fn pick_destination(&mut self, rand: &mut GoomRand) {
        if let Some(group) = &self.dominant {
            let idx = rand.next_u32_in_range(group.num_colors() as u32) as usize;
            self.dstcol = group.color(idx);
        }
    }

    fn repick_maps(&mut self, rand: &mut GoomRand) {
        self.dominant = Some(self.maps.random_group(rand));
        for t in &mut self.tentacles {
            t.colorer.set_group(self.maps.random_group(rand));
        }
    }

    fn retract(&mut self, rand: &mut GoomRand) {
        self.lig = 1.05;
        if self.ligs < 0.0 {
            self.ligs = -self.ligs;
        }
        self.step_camera(rand);
        self.cycle += 0.1;
        if self.cycle > 1000.0 {
            self.cycle = 0.0;
        }
    }

    fn step_camera(&mut self, rand: &mut GoomRand) {
        if self.mover.step(self.cycle, rand) {
            log::info!("tentacles: camera event for {} frames", self.mover.happens());
            self.repick_maps(rand);
        }
    }

    fn modulation_colors(&mut self, rand: &mut GoomRand) -> (u32, u32) {
        if self.lig > LIG_CEIL || self.lig < LIG_FLOOR {
            self.ligs = -self.ligs;
        }
        if self.lig < LIG_COLOR_CHANGE && rand.probability_of_m_in_n(1, 30) {
            self.pick_destination(rand);
        }
        self.col = evolve_color_all(self.col, self.dstcol);
        mod_colors(self.col, self.lig)
    }

    fn save_scalars(&self, w: &mut StateWriter) {
        w.put("num_grids", self.num_grids);
        w.put("cycle", self.cycle);
        w.put("lig", self.lig);
        w.put("ligs", self.ligs);
        w.put("col", self.col);
        w.put("dstcol", self.dstcol);
        w.put("rapport", self.rapport);
        w.put("osc.frequency", self.oscillator.frequency);
        w.put("osc.phase", self.oscillator.phase);
        w.put("tracker.last", self.tracker.last.unwrap_or(f32::NAN));
        w.put("tracker.rising", self.tracker.rising);
        w.put("tracker.falling", self.tracker.falling);
        if let Some(group) = &self.dominant {
            w.put("dominant", group.name());
        }
        for (i, t) in self.tentacles.iter().enumerate() {
            w.put_indexed("group", i, t.colorer.group_name());
            let heights: Vec<String> = t.grid.vertices().iter().map(|v| v.y.to_string()).collect();
            w.put_indexed("heights", i, heights.join(","));
        }
    }

    fn restore_tentacles(&mut self, r: &StateScope<'_>) -> Result<(), StateError> {
        for (i, t) in self.tentacles.iter_mut().enumerate() {
            let name: String = r.get_indexed("group", i)?;
            let group = self.maps.group(&name).ok_or_else(|| StateError::Mismatch {
                key: format!("{}.group[{i}]", Self::NAME),
                message: format!("unknown colour group {name:?}"),
            })?;
            t.colorer.set_group(group);

            let raw: String = r.get_indexed("heights", i)?;
            let mismatch = |message: String| StateError::Mismatch {
                key: format!("{}.heights[{i}]", Self::NAME),
                message,
            };
            let heights = raw
                .split(',')
                .map(|h| h.parse::<f32>().map_err(|e| mismatch(e.to_string())))
                .collect::<Result<Vec<_>, _>>()?;
            let num_x = t.grid.num_x();
            if heights.len() != num_x * t.grid.num_z() {
                return Err(mismatch(format!(
                    "state has {} heights, grid has {}",
                    heights.len(),
                    num_x * t.grid.num_z()
                )));
            }
            for (k, y) in heights.into_iter().enumerate() {
                t.grid.set_height(k % num_x, k / num_x, y);
            }
        }
        Ok(())
    }
}

/// Bright and dim line colours for the frame: the dim one is lightened again from the bright one.
pub fn mod_colors(col: u32, lig: f32) -> (u32, u32) {
    let mod_color = lighten_color(col, lig * 2.0 + 2.0);
    (mod_color, lighten_color(mod_color, lig / 2.0 + 0.67))
}

impl VisualFx for TentacleFx {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self, width: usize, height: usize, rand: &mut GoomRand) -> Result<(), FxError> {
        self.width = width;
        self.height = height;
        self.line = AntialiasedLine::new(width, height);
        self.dominant = Some(self.maps.random_group(rand));
        self.tentacles = (0..self.num_grids)
            .map(|i| {
                let group = self.maps.random_group(rand);
                Self::build_tentacle(i, group, rand)
            })
            .collect::<Result<_, _>>()?;
        self.pick_destination(rand);
        Ok(())
    }

    fn apply(&mut self, ctx: &mut FxCtx<'_>, src: &mut [u32], dst: &mut [u32]) {
        if !ctx.visible && self.ligs > 0.0 {
            self.ligs = -self.ligs;
        }
        self.lig += self.ligs;

        if self.lig <= LIG_RETRACT {
            self.retract(ctx.rand);
            return;
        }

        let (mod_color, mod_color_low) = self.modulation_colors(ctx.rand);

        let accel_var = ctx.sound.acceleration();
        self.rapport = (1.2 * (1.0 + 2.0 * (accel_var - 1.0))).min(MAX_RAPPORT);

        match self.tracker.observe(accel_var) {
            Some(Trend::Rising) => {
                let f = self.oscillator.frequency() * 1.1;
                self.oscillator.set_frequency(f);
            }
            Some(Trend::Falling) => {
                let f = self.oscillator.frequency() / 1.1;
                self.oscillator.set_frequency(f);
            }
            None => {}
        }

        self.step_camera(ctx.rand);

        let samples = ctx.sample.channel(0);
        let angle = FRAC_PI_2 - self.mover.rot();
        let dist2 = self.mover.distt2();
        for t in &mut self.tentacles {
            let amp = self.oscillator.next_value();
            for v in &mut t.vals {
                let idx = ctx.rand.next_u32_in_range((AUDIO_SAMPLE_LEN - 1) as u32) as usize;
                *v = f32::from(samples[idx] >> 10) * self.rapport * amp;
            }
            t.grid.update(angle, Some(&t.vals), dist2);
        }
        self.cycle += 0.01;

        let distance = self.mover.distt();
        for t in &mut self.tentacles {
            t.grid.draw(
                dst,
                src,
                self.width,
                self.height,
                distance,
                &mut t.colorer,
                &self.line,
                mod_color,
                mod_color_low,
            );
        }
    }

    fn free(&mut self) {
        self.tentacles.clear();
    }

    fn save(&self, w: &mut StateWriter) {
        w.section(Self::NAME);
        self.save_scalars(w);
        self.mover.save(w);
    }

    fn restore(&mut self, r: &StateReader) -> Result<(), StateError> {
        let r = r.scoped(Self::NAME);
        let num_grids: usize = r.get("num_grids")?;
        if num_grids != self.num_grids {
            return Err(StateError::Mismatch {
                key: format!("{}.num_grids", Self::NAME),
                message: format!("state has {num_grids} grids, effect has {}", self.num_grids),
            });
        }
        self.cycle = r.get("cycle")?;
        self.lig = r.get("lig")?;
        self.ligs = r.get("ligs")?;
        self.col = r.get("col")?;
        self.dstcol = r.get("dstcol")?;
        self.rapport = r.get("rapport")?;
        self.oscillator.frequency = r.get("osc.frequency")?;
        self.oscillator.phase = r.get("osc.phase")?;
        let last: f32 = r.get("tracker.last")?;
        self.tracker.last = (!last.is_nan()).then_some(last);
        self.tracker.rising = r.get("tracker.rising")?;
        self.tracker.falling = r.get("tracker.falling")?;
        if let Ok(name) = r.get::<String>("dominant") {
            self.dominant = self.maps.group(&name);
        }
        self.restore_tentacles(&r)?;
        self.mover.restore(&r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_needs_an_unbroken_run() {
        let mut t = ChangeTracker::new(0.01, 3);
        assert_eq!(t.observe(0.0), None);
        assert_eq!(t.observe(0.1), None);
        assert_eq!(t.observe(0.2), None);
        assert_eq!(t.observe(0.2), None);
        assert_eq!(t.observe(0.3), None);
        assert_eq!(t.observe(0.4), None);
        assert_eq!(t.observe(0.5), Some(Trend::Rising));
    }

    #[test]
    fn oscillator_stays_within_bounds() {
        let mut o = SineOscillator::new(0.5, 1.5);
        o.set_frequency(100.0);
        assert_eq!(o.frequency(), SineOscillator::MAX_FREQUENCY);
        for _ in 0..1000 {
            let v = o.next_value();
            assert!((0.5..=1.5).contains(&v));
        }
    }

    #[test]
    fn dim_color_is_lightened_from_the_bright_one() {
        let col = pack(0x28, 0x1c, 0x0a, 0x00);
        let lig = 3.0;
        let (bright, dim) = mod_colors(col, lig);
        assert_eq!(bright, lighten_color(col, 8.0));
        assert_eq!(dim, lighten_color(bright, 1.5 + 0.67));
    }

    #[test]
    fn blend_angle_takes_the_short_way_round() {
        let r = blend_angle(0.05, TAU - 0.05);
        assert!(r > TAU - 0.05 || r < 0.05, "r = {r}");
    }
}
