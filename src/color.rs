//! Packed 32-bit pixel helpers.
//!
//! A pixel is `0xAABBGGRR`: red in the low byte, alpha in the high byte. Every helper here
//! works per channel and saturates at 255.

use crate::rand::GoomRand;
use std::rc::Rc;

pub const RED_MASK: u32 = 0x0000_00ff;
pub const GREEN_MASK: u32 = 0x0000_ff00;
pub const BLUE_MASK: u32 = 0x00ff_0000;
pub const ALPHA_MASK: u32 = 0xff00_0000;
pub const CHANNEL_MASKS: [u32; 4] = [RED_MASK, GREEN_MASK, BLUE_MASK, ALPHA_MASK];

pub const BLACK: u32 = 0xff00_0000;

#[inline]
pub fn pack(r: u8, g: u8, b: u8, a: u8) -> u32 {
    u32::from(r) | (u32::from(g) << 8) | (u32::from(b) << 16) | (u32::from(a) << 24)
}

#[inline]
pub fn channels(c: u32) -> [u8; 4] {
    c.to_le_bytes()
}

#[inline]
pub fn from_channels(ch: [u8; 4]) -> u32 {
    u32::from_le_bytes(ch)
}

#[inline]
pub fn red(c: u32) -> u8 {
    (c & RED_MASK) as u8
}

#[inline]
pub fn green(c: u32) -> u8 {
    ((c & GREEN_MASK) >> 8) as u8
}

#[inline]
pub fn blue(c: u32) -> u8 {
    ((c & BLUE_MASK) >> 16) as u8
}

#[inline]
pub fn alpha(c: u32) -> u8 {
    (c >> 24) as u8
}

#[inline]
fn map_channels(a: u32, b: u32, f: impl Fn(u8, u8) -> u8) -> u32 {
    let (ca, cb) = (channels(a), channels(b));
    from_channels([f(ca[0], cb[0]), f(ca[1], cb[1]), f(ca[2], cb[2]), f(ca[3], cb[3])])
}

/// Per-channel saturating add.
#[inline]
pub fn color_add(a: u32, b: u32) -> u32 {
    map_channels(a, b, u8::saturating_add)
}

/// Adds half of each channel of `c` to `base`, saturating.
#[inline]
pub fn color_half_add(base: u32, c: u32) -> u32 {
    map_channels(base, c, |x, y| x.saturating_add(y >> 1))
}

/// Right-shifts every channel by `shift` bits.
#[inline]
pub fn shift_channels(c: u32, shift: u32) -> u32 {
    if shift >= 8 {
        return 0;
    }
    let m = 0xffu32 >> shift;
    let lane = m | (m << 8) | (m << 16) | (m << 24);
    (c >> shift) & lane
}

/// Scales every channel by `coverage` in `[0, 1]`.
#[inline]
pub fn scale_color(c: u32, coverage: f32) -> u32 {
    let k = coverage.clamp(0.0, 1.0);
    let ch = channels(c);
    from_channels(ch.map(|v| (f32::from(v) * k) as u8))
}

/// Moves the masked field of `src` toward the same field of `dest` by at most `incr`.
///
/// `incr` is expressed in the mask's own units (`0x100` is one step of green). The result
/// never passes `dest` and the bits outside `mask` are kept.
pub fn evolve_color(src: u32, dest: u32, mask: u32, incr: u32) -> u32 {
    let keep = src & !mask;
    let s = u64::from(src & mask);
    let d = u64::from(dest & mask);
    let step = u64::from(incr);
    let next = if s < d {
        (s + step).min(d)
    } else if s > d {
        s - step.min(s - d)
    } else {
        s
    };
    keep | (next as u32 & mask)
}

/// Steps all four channels of `src` toward `dest`, one byte unit per channel.
pub fn evolve_color_all(src: u32, dest: u32) -> u32 {
    CHANNEL_MASKS
        .iter()
        .fold(src, |acc, &mask| evolve_color(acc, dest, mask, mask & 0x0101_0101))
}

/// Brightens a channel value by a log10 curve, clamped to a byte.
#[inline]
pub fn lighten(value: u8, power: f32) -> u8 {
    let t = f32::from(value) * power.log10() / 2.0;
    if t.is_nan() || t <= 0.0 {
        0
    } else if t >= 255.0 {
        255
    } else {
        t as u8
    }
}

/// [`lighten`] applied to red, green and blue; alpha is kept.
pub fn lighten_color(c: u32, power: f32) -> u32 {
    let [r, g, b, a] = channels(c);
    pack(lighten(r, power), lighten(g, power), lighten(b, power), a)
}

/// Per-channel linear blend, `t = 0` gives `a`, `t = 1` gives `b`.
pub fn color_mix(a: u32, b: u32, t: f32) -> u32 {
    let t = t.clamp(0.0, 1.0);
    map_channels(a, b, |x, y| {
        let v = f32::from(x) + (f32::from(y) - f32::from(x)) * t;
        v.round().clamp(0.0, 255.0) as u8
    })
}

/// A named, indexable run of colours.
pub trait ColorGroup {
    fn name(&self) -> &str;
    fn num_colors(&self) -> usize;
    fn color(&self, index: usize) -> u32;
}

/// Colour group sampled from evenly spaced gradient stops.
#[derive(Debug, Clone)]
pub struct GradientMap {
    name: &'static str,
    colors: Vec<u32>,
}

impl GradientMap {
    pub fn new(name: &'static str, stops: &[u32], num_colors: usize) -> Self {
        let n = num_colors.max(1);
        let colors = (0..n)
            .map(|i| {
                if stops.len() < 2 {
                    return stops.first().copied().unwrap_or(BLACK);
                }
                let t = if n == 1 { 0.0 } else { i as f32 / (n - 1) as f32 };
                let pos = t * (stops.len() - 1) as f32;
                let lo = (pos.floor() as usize).min(stops.len() - 2);
                color_mix(stops[lo], stops[lo + 1], pos - lo as f32)
            })
            .collect();
        Self { name, colors }
    }
}

impl ColorGroup for GradientMap {
    fn name(&self) -> &str {
        self.name
    }

    fn num_colors(&self) -> usize {
        self.colors.len()
    }

    fn color(&self, index: usize) -> u32 {
        self.colors[index.min(self.colors.len() - 1)]
    }
}

/// The built-in colour groups.
pub struct ColorMaps {
    groups: Vec<Rc<dyn ColorGroup>>,
}

impl Default for ColorMaps {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorMaps {
    const STEPS: usize = 64;

    pub fn new() -> Self {
        let maps = [
            GradientMap::new(
                "sea",
                &[pack(0, 8, 40, 255), pack(0, 90, 160, 255), pack(120, 220, 255, 255)],
                Self::STEPS,
            ),
            GradientMap::new(
                "fire",
                &[
                    pack(40, 0, 0, 255),
                    pack(220, 60, 0, 255),
                    pack(255, 200, 40, 255),
                    pack(255, 255, 220, 255),
                ],
                Self::STEPS,
            ),
            GradientMap::new(
                "forest",
                &[pack(10, 30, 5, 255), pack(60, 140, 40, 255), pack(200, 240, 120, 255)],
                Self::STEPS,
            ),
            GradientMap::new(
                "candy",
                &[pack(255, 60, 160, 255), pack(150, 80, 255, 255), pack(60, 220, 255, 255)],
                Self::STEPS,
            ),
            GradientMap::new(
                "ice",
                &[pack(20, 20, 60, 255), pack(140, 180, 230, 255), pack(250, 250, 255, 255)],
                Self::STEPS,
            ),
            GradientMap::new(
                "sunset",
                &[
                    pack(40, 10, 70, 255),
                    pack(200, 50, 90, 255),
                    pack(255, 150, 60, 255),
                    pack(255, 230, 150, 255),
                ],
                Self::STEPS,
            ),
        ];
        Self {
            groups: maps
                .into_iter()
                .map(|m| Rc::new(m) as Rc<dyn ColorGroup>)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.name())
    }

    pub fn random_group(&self, rand: &mut GoomRand) -> Rc<dyn ColorGroup> {
        let idx = rand.next_u32_in_range(self.groups.len() as u32) as usize;
        Rc::clone(&self.groups[idx])
    }

    pub fn group(&self, name: &str) -> Option<Rc<dyn ColorGroup>> {
        self.groups.iter().find(|g| g.name() == name).cloned()
    }

    /// A random colour from a random group.
    pub fn random_color(&self, rand: &mut GoomRand) -> u32 {
        let group = self.random_group(rand);
        let idx = rand.next_u32_in_range(group.num_colors() as u32) as usize;
        group.color(idx)
    }
}
