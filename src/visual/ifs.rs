use super::fixed::{div_by_2units, Fixed, Similitude};
use super::{FxCtx, FxError, VisualFx};
use crate::color::{channels, color_half_add, from_channels, shift_channels, ColorMaps};
use crate::rand::GoomRand;
use crate::state::{StateError, StateReader, StateScope, StateWriter};
use std::f32::consts::PI;

/// Keyframe generations kept per component: the blended one plus four control points.
pub const NUM_GENERATIONS: usize = 5;
pub const MIN_COMPONENTS: usize = 2;
pub const MAX_COMPONENTS: usize = 5;

const DEFAULT_SPEED: u32 = 6;
const COLOR_CYCLE: u32 = 80;
const MODE_COOLDOWN: i32 = 250;
const DECAY_FRAMES: i32 = 100;
const RECAY_FRAMES: i32 = 5;
const RECAY_INCR: i32 = 11;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IfsPoint {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ShapeParams {
    depth: u32,
    r_mean: f32,
    dr_mean: f32,
    dr2_mean: f32,
}

fn shape_params(num_simi: usize) -> ShapeParams {
    let (depth, r_mean, dr_mean, dr2_mean) = match num_simi {
        3 => (6, 0.6, 0.4, 0.3),
        4 => (4, 0.5, 0.4, 0.3),
        5 => (2, 0.5, 0.4, 0.3),
        _ => (10, 0.7, 0.3, 0.4),
    };
    ShapeParams {
        depth,
        r_mean,
        dr_mean,
        dr2_mean,
    }
}

/// Worst-case point count of one trace pass: `(n - 1) * n^(depth + 3)`.
pub fn max_points(num_simi: usize, depth: u32) -> usize {
    let n = num_simi.max(1);
    let mut max = n - 1;
    for _ in 0..=depth + 2 {
        max = max.saturating_mul(n);
    }
    max
}

#[inline]
fn one_minus_exp_neg(s: f32) -> f32 {
    1.0 - (-s).exp()
}

/// `c ± a * (1 - exp(-y²s))`, `y` uniform on `[0, 1]`.
pub fn gauss_rand(rand: &mut GoomRand, c: f32, s: f32, a: f32) -> f32 {
    let x = rand.unit_f32();
    let y = a * (1.0 - (-x * x * s).exp());
    if rand.probability_of_m_in_n(1, 2) { c + y } else { c - y }
}

/// Same shape as [`gauss_rand`] but only ever offsets upward.
pub fn half_gauss_rand(rand: &mut GoomRand, c: f32, s: f32, a: f32) -> f32 {
    let x = rand.unit_f32();
    let y = a * (1.0 - (-x * x * s).exp());
    c + y
}

/// Two point buffers; one holds the last finished trace, the other is written by the next.
#[derive(Debug, Default)]
struct PointBuffers {
    slots: [Vec<IfsPoint>; 2],
    live: usize,
}

impl PointBuffers {
    fn allocate(capacity: usize) -> Result<Self, std::collections::TryReserveError> {
        let mut slots: [Vec<IfsPoint>; 2] = [Vec::new(), Vec::new()];
        for slot in &mut slots {
            slot.try_reserve_exact(capacity)?;
        }
        Ok(Self { slots, live: 0 })
    }

    fn live(&self) -> &[IfsPoint] {
        &self.slots[self.live]
    }

    fn scratch(&mut self) -> &mut Vec<IfsPoint> {
        &mut self.slots[1 - self.live]
    }

    fn swap(&mut self) {
        self.live = 1 - self.live;
    }
}

/// The morphing IFS point cloud.
#[derive(Debug)]
pub struct Fractal {
    num_simi: usize,
    components: Vec<Similitude>,
    depth: u32,
    count: u32,
    speed: u32,
    width: u32,
    height: u32,
    lx: Fixed,
    ly: Fixed,
    r_mean: f32,
    dr_mean: f32,
    dr2_mean: f32,
    cur_pt: usize,
    max_pt: usize,
    buffers: PointBuffers,
    enabled: bool,
}

impl Fractal {
    /// Seeds a fractal with a random component count.
    pub fn new(width: u32, height: u32, rand: &mut GoomRand) -> Self {
        let spread = (MAX_COMPONENTS - MIN_COMPONENTS + 1) as u32;
        let n = MIN_COMPONENTS + rand.next_u32_in_range(spread) as usize;
        Self::with_components(width, height, n, rand)
    }

    pub fn with_components(width: u32, height: u32, num_simi: usize, rand: &mut GoomRand) -> Self {
        let num_simi = num_simi.clamp(MIN_COMPONENTS, MAX_COMPONENTS);
        let shape = shape_params(num_simi);
        let max_pt = max_points(num_simi, shape.depth);

        let (buffers, enabled) = match PointBuffers::allocate(max_pt) {
            Ok(b) => (b, true),
            Err(e) => {
                log::warn!("ifs: cannot hold {max_pt} points ({e}), fractal disabled");
                (PointBuffers::default(), false)
            }
        };

        let mut fractal = Self {
            num_simi,
            components: vec![Similitude::default(); NUM_GENERATIONS * num_simi],
            depth: shape.depth,
            count: 0,
            speed: DEFAULT_SPEED,
            width,
            height,
            lx: (width.saturating_sub(1) / 2) as Fixed,
            ly: (height.saturating_sub(1) / 2) as Fixed,
            r_mean: shape.r_mean,
            dr_mean: shape.dr_mean,
            dr2_mean: shape.dr2_mean,
            cur_pt: 0,
            max_pt,
            buffers,
            enabled,
        };
        let all = fractal.components.len();
        fractal.randomize(0, all, rand);
        log::debug!(
            "ifs: {num_simi} components, depth {}, max {} points",
            fractal.depth,
            fractal.max_pt
        );
        fractal
    }

    fn randomize(&mut self, start: usize, len: usize, rand: &mut GoomRand) {
        let c_factor = 0.8 * one_minus_exp_neg(4.0);
        let r_factor = self.dr_mean * one_minus_exp_neg(3.0);
        let r2_factor = self.dr2_mean * one_minus_exp_neg(2.0);
        let a_factor = 360.0 * one_minus_exp_neg(4.0);
        let r_mean = self.r_mean;

        for s in &mut self.components[start..start + len] {
            s.c_x = gauss_rand(rand, 0.0, 4.0, c_factor);
            s.c_y = gauss_rand(rand, 0.0, 4.0, c_factor);
            s.r = gauss_rand(rand, r_mean, 3.0, r_factor);
            s.r2 = half_gauss_rand(rand, 0.0, 2.0, r2_factor);
            s.a = gauss_rand(rand, 0.0, 4.0, a_factor) * (PI / 180.0);
            s.a2 = gauss_rand(rand, 0.0, 4.0, a_factor) * (PI / 180.0);
            s.clear_fixed();
        }
    }

    /// Frames per full interpolation window.
    pub fn max_count(&self) -> u32 {
        1000 / self.speed.max(1)
    }

    /// Advances one frame and returns the freshly traced point cloud.
    pub fn render(&mut self, rand: &mut GoomRand) -> &[IfsPoint] {
        if !self.enabled {
            return &[];
        }
        self.blend();
        self.draw_fractal();

        if self.count < self.max_count() {
            self.count += 1;
        } else {
            self.slide(rand);
        }
        self.buffers.live()
    }

    fn blend(&mut self) {
        let u = self.count as f32 * self.speed as f32 / 1000.0;
        let v = 1.0 - u;
        let w = [v * v * v, 3.0 * v * v * u, 3.0 * v * u * u, u * u * u];
        let n = self.num_simi;

        for i in 0..n {
            let g = [
                self.components[n + i],
                self.components[2 * n + i],
                self.components[3 * n + i],
                self.components[4 * n + i],
            ];
            let mix = |f: fn(&Similitude) -> f32| -> f32 {
                w[0] * f(&g[0]) + w[1] * f(&g[1]) + w[2] * f(&g[2]) + w[3] * f(&g[3])
            };
            let s = &mut self.components[i];
            s.c_x = mix(|s| s.c_x);
            s.c_y = mix(|s| s.c_y);
            s.r = mix(|s| s.r);
            s.r2 = mix(|s| s.r2);
            s.a = mix(|s| s.a);
            s.a2 = mix(|s| s.a2);
        }
    }

    fn slide(&mut self, rand: &mut GoomRand) {
        let n = self.num_simi;
        for i in 0..n {
            let s3 = self.components[3 * n + i];
            let s4 = self.components[4 * n + i];
            let s2 = &mut self.components[2 * n + i];
            s2.c_x = 2.0 * s4.c_x - s3.c_x;
            s2.c_y = 2.0 * s4.c_y - s3.c_y;
            s2.r = 2.0 * s4.r - s3.r;
            s2.r2 = 2.0 * s4.r2 - s3.r2;
            s2.a = 2.0 * s4.a - s3.a;
            s2.a2 = 2.0 * s4.a2 - s3.a2;
            self.components[n + i] = s4;
        }
        self.randomize(3 * n, n, rand);
        self.randomize(4 * n, n, rand);
        self.count = 0;
    }

    fn draw_fractal(&mut self) {
        let n = self.num_simi;
        for s in &mut self.components[..n] {
            s.prepare();
        }

        let simis = &self.components[..n];
        let tracer = Tracer {
            simis,
            lx: self.lx,
            ly: self.ly,
            max_pt: self.max_pt,
        };
        let out = self.buffers.scratch();
        out.clear();
        for (ci, cur) in simis.iter().enumerate() {
            let (xo, yo) = (cur.cx, cur.cy);
            for (si, simi) in simis.iter().enumerate() {
                if si == ci {
                    continue;
                }
                let (x, y) = simi.transform(xo, yo);
                tracer.trace(self.depth, x, y, out);
            }
        }
        self.cur_pt = out.len();
        self.buffers.swap();
    }

    pub fn num_simi(&self) -> usize {
        self.num_simi
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    pub fn cur_pt(&self) -> usize {
        self.cur_pt
    }

    pub fn max_pt(&self) -> usize {
        self.max_pt
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Similitudes of generation `g` (0 is the blended, active one).
    pub fn generation(&self, g: usize) -> &[Similitude] {
        let n = self.num_simi;
        &self.components[g * n..(g + 1) * n]
    }

    pub fn points(&self) -> &[IfsPoint] {
        self.buffers.live()
    }

    fn save(&self, w: &mut StateWriter) {
        w.put("fractal.num_simi", self.num_simi);
        w.put("fractal.depth", self.depth);
        w.put("fractal.count", self.count);
        w.put("fractal.speed", self.speed);
        w.put("fractal.width", self.width);
        w.put("fractal.height", self.height);
        w.put("fractal.lx", self.lx);
        w.put("fractal.ly", self.ly);
        w.put("fractal.r_mean", self.r_mean);
        w.put("fractal.dr_mean", self.dr_mean);
        w.put("fractal.dr2_mean", self.dr2_mean);
        w.put("fractal.cur_pt", self.cur_pt);
        w.put("fractal.max_pt", self.max_pt);
        w.put("fractal.enabled", self.enabled);
        for (i, s) in self.components.iter().enumerate() {
            w.put_indexed("simi.c_x", i, s.c_x);
            w.put_indexed("simi.c_y", i, s.c_y);
            w.put_indexed("simi.r", i, s.r);
            w.put_indexed("simi.r2", i, s.r2);
            w.put_indexed("simi.a", i, s.a);
            w.put_indexed("simi.a2", i, s.a2);
            w.put_indexed("simi.ct", i, s.ct);
            w.put_indexed("simi.st", i, s.st);
            w.put_indexed("simi.ct2", i, s.ct2);
            w.put_indexed("simi.st2", i, s.st2);
            w.put_indexed("simi.cx", i, s.cx);
            w.put_indexed("simi.cy", i, s.cy);
            w.put_indexed("simi.rr", i, s.rr);
            w.put_indexed("simi.rr2", i, s.rr2);
        }
    }

    fn restore(r: &StateScope<'_>) -> Result<Self, StateError> {
        let num_simi: usize = r.get("fractal.num_simi")?;
        if !(MIN_COMPONENTS..=MAX_COMPONENTS).contains(&num_simi) {
            return Err(StateError::Mismatch {
                key: "fractal.num_simi".to_string(),
                message: format!("expected {MIN_COMPONENTS}..={MAX_COMPONENTS}, got {num_simi}"),
            });
        }
        let max_pt: usize = r.get("fractal.max_pt")?;
        let depth: u32 = r.get("fractal.depth")?;
        if max_pt != max_points(num_simi, depth) {
            return Err(StateError::Mismatch {
                key: "fractal.max_pt".to_string(),
                message: format!("does not match {num_simi} components at depth {depth}"),
            });
        }
        let mut components = Vec::with_capacity(NUM_GENERATIONS * num_simi);
        for i in 0..NUM_GENERATIONS * num_simi {
            components.push(Similitude {
                c_x: r.get_indexed("simi.c_x", i)?,
                c_y: r.get_indexed("simi.c_y", i)?,
                r: r.get_indexed("simi.r", i)?,
                r2: r.get_indexed("simi.r2", i)?,
                a: r.get_indexed("simi.a", i)?,
                a2: r.get_indexed("simi.a2", i)?,
                ct: r.get_indexed("simi.ct", i)?,
                st: r.get_indexed("simi.st", i)?,
                ct2: r.get_indexed("simi.ct2", i)?,
                st2: r.get_indexed("simi.st2", i)?,
                cx: r.get_indexed("simi.cx", i)?,
                cy: r.get_indexed("simi.cy", i)?,
                rr: r.get_indexed("simi.rr", i)?,
                rr2: r.get_indexed("simi.rr2", i)?,
            });
        }
        let mut enabled = r.get_bool("fractal.enabled")?;
        let buffers = match PointBuffers::allocate(max_pt) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("ifs: cannot hold {max_pt} restored points ({e}), fractal disabled");
                enabled = false;
                PointBuffers::default()
            }
        };
        Ok(Self {
            num_simi,
            components,
            depth,
            count: r.get("fractal.count")?,
            speed: r.get("fractal.speed")?,
            width: r.get("fractal.width")?,
            height: r.get("fractal.height")?,
            lx: r.get("fractal.lx")?,
            ly: r.get("fractal.ly")?,
            r_mean: r.get("fractal.r_mean")?,
            dr_mean: r.get("fractal.dr_mean")?,
            dr2_mean: r.get("fractal.dr2_mean")?,
            cur_pt: r.get("fractal.cur_pt")?,
            max_pt,
            buffers,
            enabled,
        })
    }
}

struct Tracer<'a> {
    simis: &'a [Similitude],
    lx: Fixed,
    ly: Fixed,
    max_pt: usize,
}

impl Tracer<'_> {
    fn trace(&self, depth: u32, xo: Fixed, yo: Fixed, out: &mut Vec<IfsPoint>) {
        for simi in self.simis {
            if out.len() >= self.max_pt {
                return;
            }
            let (x, y) = simi.transform(xo, yo);
            out.push(IfsPoint {
                x: self.lx.wrapping_add(div_by_2units(x.wrapping_mul(self.lx))) as u32,
                y: self.ly.wrapping_sub(div_by_2units(y.wrapping_mul(self.ly))) as u32,
            });

            if depth > 0
                && (x.wrapping_sub(xo) >> 4) != 0
                && (y.wrapping_sub(yo) >> 4) != 0
            {
                self.trace(depth - 1, x, y, out);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Sea,
    SeaGreen,
    Fire,
}

impl ColorMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Sea => "sea",
            Self::SeaGreen => "sea-green",
            Self::Fire => "fire",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sea" => Some(Self::Sea),
            "sea-green" => Some(Self::SeaGreen),
            "fire" => Some(Self::Fire),
            _ => None,
        }
    }
}

const R: usize = 0;
const G: usize = 1;
const B: usize = 2;
const A: usize = 3;

/// The slowly drifting base colour of the point cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct IfsColors {
    couleur: u32,
    v: [i32; 4],
    col: [i32; 4],
    just_changed: i32,
    mode: ColorMode,
    cycle: u32,
}

impl Default for IfsColors {
    fn default() -> Self {
        Self {
            couleur: 0xc0c0_c0c0,
            v: [2, 4, 3, 2],
            col: [2, 4, 3, 2],
            just_changed: 0,
            mode: ColorMode::SeaGreen,
            cycle: 0,
        }
    }
}

impl IfsColors {
    pub fn base_color(&self) -> u32 {
        self.couleur
    }

    pub fn set_base_color(&mut self, c: u32) {
        self.couleur = c;
    }

    pub fn mode(&self) -> ColorMode {
        self.mode
    }

    /// Advances the 80-frame brightness cycle and returns this frame's draw colour.
    pub fn next_draw_color(&mut self) -> u32 {
        self.cycle += 1;
        if self.cycle >= COLOR_CYCLE {
            self.cycle = 0;
        }
        let shift = if self.cycle < 40 {
            self.cycle / 10
        } else {
            7 - self.cycle / 10
        };
        shift_channels(self.couleur, shift)
    }

    /// One step of the active mode's channel drift.
    pub fn evolve(&mut self, rand: &mut GoomRand) {
        self.just_changed -= 1;
        self.col = channels(self.couleur).map(i32::from);
        let before = self.mode;
        match self.mode {
            ColorMode::Sea => self.evolve_sea(rand),
            ColorMode::SeaGreen => self.evolve_sea_green(rand),
            ColorMode::Fire => self.evolve_fire(rand),
        }
        self.couleur = from_channels(self.col.map(|c| c.clamp(0, 255) as u8));
        if self.mode != before {
            log::info!("ifs: colour mode {} -> {}", before.as_str(), self.mode.as_str());
        }
    }

    fn down(rand: &mut GoomRand, m: u32, add: i32) -> i32 {
        -(rand.next_u32_in_range(m) as i32) - add
    }

    fn up(rand: &mut GoomRand, m: u32, add: i32) -> i32 {
        rand.next_u32_in_range(m) as i32 + add
    }

    fn ceil(&mut self, ch: usize, hi: i32, m: u32, add: i32, rand: &mut GoomRand) {
        if self.col[ch] > hi {
            self.col[ch] = hi;
            self.v[ch] = Self::down(rand, m, add);
        }
    }

    fn floor(&mut self, ch: usize, lo: i32, m: u32, add: i32, rand: &mut GoomRand) {
        if self.col[ch] < lo {
            self.col[ch] = lo;
            self.v[ch] = Self::up(rand, m, add);
        }
    }

    fn drift(&mut self, ch: usize, lo: i32, hi: i32, m: u32, add: i32, rand: &mut GoomRand) {
        self.col[ch] += self.v[ch];
        self.ceil(ch, hi, m, add, rand);
        self.floor(ch, lo, m, add, rand);
    }

    fn sea_like_ready(&self, rand: &mut GoomRand) -> bool {
        let c = &self.col;
        c[G] > 32
            && c[R] < c[G] + 40
            && c[G] < c[R] + 20
            && c[B] < 64
            && rand.next_u32_in_range(20) == 0
            && self.just_changed < 0
    }

    fn evolve_sea(&mut self, rand: &mut GoomRand) {
        self.drift(B, 32, 255, 4, 1, rand);

        self.col[G] += self.v[G];
        self.ceil(G, 200, 3, 2, rand);
        if self.col[G] > self.col[B] {
            self.col[G] = self.col[B];
            self.v[G] = self.v[B];
        }
        self.floor(G, 32, 3, 2, rand);

        self.drift(R, 0, 64, 4, 1, rand);
        self.drift(A, 0, 0, 4, 1, rand);

        if self.sea_like_ready(rand) {
            self.mode = if rand.next_u32_in_range(3) != 0 {
                ColorMode::Fire
            } else {
                ColorMode::SeaGreen
            };
            self.just_changed = MODE_COOLDOWN;
        }
    }

    fn evolve_sea_green(&mut self, rand: &mut GoomRand) {
        self.drift(B, 16, 128, 4, 1, rand);

        self.col[G] += self.v[G];
        self.ceil(G, 200, 3, 2, rand);
        if self.col[G] > self.col[A] {
            self.col[G] = self.col[A];
            self.v[G] = self.v[A];
        }
        self.floor(G, 32, 3, 2, rand);

        self.drift(R, 0, 128, 4, 1, rand);
        self.drift(A, 0, 255, 4, 1, rand);

        if self.sea_like_ready(rand) {
            self.mode = if rand.next_u32_in_range(3) != 0 {
                ColorMode::Fire
            } else {
                ColorMode::Sea
            };
            self.just_changed = MODE_COOLDOWN;
        }
    }

    fn evolve_fire(&mut self, rand: &mut GoomRand) {
        self.drift(B, 0, 64, 4, 1, rand);

        self.col[G] += self.v[G];
        self.ceil(G, 200, 3, 2, rand);
        if self.col[G] > self.col[R] + 20 {
            self.col[G] = self.col[R] + 20;
            self.v[G] = Self::down(rand, 3, 2);
            self.v[R] = Self::up(rand, 4, 1);
            self.v[B] = Self::up(rand, 4, 1);
        }
        self.floor(G, 0, 3, 2, rand);

        self.col[R] += self.v[R];
        self.ceil(R, 255, 4, 1, rand);
        if self.col[R] > self.col[G] + 40 {
            self.col[R] = self.col[G] + 40;
            self.v[R] = Self::down(rand, 4, 1);
        }
        self.floor(R, 0, 4, 1, rand);

        self.drift(A, 0, 0, 4, 1, rand);

        let c = &self.col;
        if c[R] < 64
            && c[G] > 32
            && c[G] < c[B]
            && c[B] > 32
            && rand.next_u32_in_range(20) == 0
            && self.just_changed < 0
        {
            self.mode = if rand.next_u32_in_range(2) != 0 {
                ColorMode::Sea
            } else {
                ColorMode::SeaGreen
            };
            self.just_changed = MODE_COOLDOWN;
        }
    }

    fn save(&self, w: &mut StateWriter) {
        w.put("colors.couleur", self.couleur);
        for i in 0..4 {
            w.put_indexed("colors.v", i, self.v[i]);
            w.put_indexed("colors.col", i, self.col[i]);
        }
        w.put("colors.just_changed", self.just_changed);
        w.put("colors.mode", self.mode.as_str());
        w.put("colors.cycle", self.cycle);
    }

    fn restore(&mut self, r: &StateScope<'_>) -> Result<(), StateError> {
        self.couleur = r.get("colors.couleur")?;
        for i in 0..4 {
            self.v[i] = r.get_indexed("colors.v", i)?;
            self.col[i] = r.get_indexed("colors.col", i)?;
        }
        self.just_changed = r.get("colors.just_changed")?;
        let mode: String = r.get("colors.mode")?;
        self.mode = ColorMode::parse(&mode).ok_or_else(|| StateError::Mismatch {
            key: "colors.mode".to_string(),
            message: format!("unknown colour mode {mode:?}"),
        })?;
        self.cycle = r.get("colors.cycle")?;
        Ok(())
    }
}

/// The IFS visual effect: fractal, colour drift and the fade in/out driven by visibility.
pub struct IfsFx {
    width: usize,
    height: usize,
    fractal: Option<Fractal>,
    colors: IfsColors,
    maps: ColorMaps,
    incr: i32,
    decay: i32,
    recay: i32,
}

impl Default for IfsFx {
    fn default() -> Self {
        Self::new()
    }
}

impl IfsFx {
    pub const NAME: &'static str = "ifs";

    pub fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            fractal: None,
            colors: IfsColors::default(),
            maps: ColorMaps::new(),
            incr: 1,
            decay: 0,
            recay: 0,
        }
    }

    pub fn fractal(&self) -> Option<&Fractal> {
        self.fractal.as_ref()
    }

    pub fn colors(&self) -> &IfsColors {
        &self.colors
    }

    /// Draw stride; 0 or less means nothing is drawn.
    pub fn incr(&self) -> i32 {
        self.incr
    }

    pub fn decay(&self) -> i32 {
        self.decay
    }

    pub fn recay(&self) -> i32 {
        self.recay
    }

    pub fn renew(&mut self, rand: &mut GoomRand) {
        self.colors.set_base_color(self.maps.random_color(rand));
    }

    fn track_visibility(&mut self, visible: bool, rand: &mut GoomRand) {
        if visible {
            if self.incr <= 0 {
                self.recay = RECAY_FRAMES;
                self.incr = RECAY_INCR;
                self.renew(rand);
            }
        } else if self.incr > 0 && self.decay <= 0 {
            self.decay = DECAY_FRAMES;
        }

        self.decay = (self.decay - 1).max(-1);
        if self.decay > 0 {
            self.incr += 2;
        }
        if self.decay == 0 {
            self.incr = 0;
        }

        if self.recay != 0 {
            self.incr -= 2;
            self.recay -= 1;
            if self.recay == 0 && self.incr <= 0 {
                self.incr = 1;
            }
        }
    }
}

impl VisualFx for IfsFx {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self, width: usize, height: usize, rand: &mut GoomRand) -> Result<(), FxError> {
        self.width = width;
        self.height = height;
        self.fractal = Some(Fractal::new(width as u32, height as u32, rand));
        self.colors = IfsColors::default();
        self.incr = 1;
        self.decay = 0;
        self.recay = 0;
        self.renew(rand);
        Ok(())
    }

    fn apply(&mut self, ctx: &mut FxCtx<'_>, src: &mut [u32], dst: &mut [u32]) {
        self.track_visibility(ctx.visible, ctx.rand);
        if self.incr <= 0 {
            return;
        }
        let Some(fractal) = self.fractal.as_mut() else {
            return;
        };

        let color = self.colors.next_draw_color();
        let (w, h) = (self.width as u32, self.height as u32);
        let points = fractal.render(ctx.rand);
        for p in points.iter().step_by(self.incr as usize) {
            let (x, y) = (p.x & 0x7fff_ffff, p.y & 0x7fff_ffff);
            if x < w && y < h {
                let pos = (x + y * w) as usize;
                if let (Some(s), Some(d)) = (src.get_mut(pos), dst.get_mut(pos)) {
                    *s = color_half_add(*s, color);
                    *d = color_half_add(*d, color);
                }
            }
        }
        self.colors.evolve(ctx.rand);
    }

    fn free(&mut self) {
        self.fractal = None;
    }

    fn save(&self, w: &mut StateWriter) {
        w.section(Self::NAME);
        w.put("incr", self.incr);
        w.put("decay", self.decay);
        w.put("recay", self.recay);
        w.put("width", self.width);
        w.put("height", self.height);
        self.colors.save(w);
        w.put("has_fractal", self.fractal.is_some());
        if let Some(f) = &self.fractal {
            f.save(w);
        }
    }

    fn restore(&mut self, r: &StateReader) -> Result<(), StateError> {
        let r = r.scoped(Self::NAME);
        self.incr = r.get("incr")?;
        self.decay = r.get("decay")?;
        self.recay = r.get("recay")?;
        self.width = r.get("width")?;
        self.height = r.get("height")?;
        self.colors.restore(&r)?;
        self.fractal = if r.get_bool("has_fractal")? {
            Some(Fractal::restore(&r)?)
        } else {
            None
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_points_matches_depth_table() {
        assert_eq!(max_points(2, 10), 8192);
        assert_eq!(max_points(3, 6), 2 * 3usize.pow(9));
        assert_eq!(max_points(5, 2), 4 * 5usize.pow(5));
    }

    #[test]
    fn half_gauss_never_goes_below_centre() {
        let mut rand = GoomRand::new(5);
        for _ in 0..500 {
            assert!(half_gauss_rand(&mut rand, 0.0, 2.0, 0.3) >= 0.0);
        }
    }

    #[test]
    fn brightness_cycle_is_triangular() {
        let mut c = IfsColors::default();
        c.set_base_color(0x8080_8080);
        let shifts: Vec<u32> = (0..COLOR_CYCLE)
            .map(|_| {
                let drawn = c.next_draw_color();
                7 - (drawn & 0xff).trailing_zeros()
            })
            .collect();
        assert_eq!(shifts[0], 0);
        assert_eq!(shifts[38], 3);
        assert_eq!(shifts[79], 0);
    }

    #[test]
    fn decay_thins_then_hides() {
        let mut fx = IfsFx::new();
        let mut rand = GoomRand::new(3);
        fx.track_visibility(false, &mut rand);
        assert_eq!(fx.decay(), DECAY_FRAMES - 1);
        assert_eq!(fx.incr(), 3);
        for _ in 0..DECAY_FRAMES - 1 {
            fx.track_visibility(false, &mut rand);
        }
        assert_eq!(fx.incr(), 0);
        fx.track_visibility(true, &mut rand);
        assert_eq!(fx.recay(), RECAY_FRAMES - 1);
        assert_eq!(fx.incr(), RECAY_INCR - 2);
    }
}
