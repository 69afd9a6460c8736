use crate::color::{color_add, scale_color};

const EPSILON: f32 = 1.0e-6;

/// Rasterises one line into several aligned pixel buffers at once, one colour per buffer.
pub trait LineDrawer {
    fn draw_line(&self, buffers: &mut [&mut [u32]], colors: &[u32], p1: (i32, i32), p2: (i32, i32));
}

/// Wu-style antialiased line with additive, coverage-weighted blending.
#[derive(Debug, Clone, Copy)]
pub struct AntialiasedLine {
    width: usize,
    height: usize,
}

impl AntialiasedLine {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    fn inside(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    fn plot(&self, buffers: &mut [&mut [u32]], colors: &[u32], x: i32, y: i32, coverage: f32) {
        if !self.inside(x, y) || coverage <= 0.0 {
            return;
        }
        let pos = y as usize * self.width + x as usize;
        for (buf, &c) in buffers.iter_mut().zip(colors) {
            if let Some(px) = buf.get_mut(pos) {
                *px = color_add(*px, scale_color(c, coverage));
            }
        }
    }
}

impl LineDrawer for AntialiasedLine {
    fn draw_line(&self, buffers: &mut [&mut [u32]], colors: &[u32], p1: (i32, i32), p2: (i32, i32)) {
        if !self.inside(p1.0, p1.1) || !self.inside(p2.0, p2.1) {
            return;
        }
        if p1 == p2 {
            self.plot(buffers, colors, p1.0, p1.1, 1.0);
            return;
        }

        let (mut x0, mut y0) = (p1.0 as f32, p1.1 as f32);
        let (mut x1, mut y1) = (p2.0 as f32, p2.1 as f32);
        let steep = (y1 - y0).abs() > (x1 - x0).abs();
        if steep {
            std::mem::swap(&mut x0, &mut y0);
            std::mem::swap(&mut x1, &mut y1);
        }
        if x0 > x1 {
            std::mem::swap(&mut x0, &mut x1);
            std::mem::swap(&mut y0, &mut y1);
        }

        let dx = x1 - x0;
        let dy = y1 - y0;
        let gradient = if dx.abs() < EPSILON { 1.0 } else { dy / dx };
        if !gradient.is_finite() {
            return;
        }

        let mut intery = y0;
        let (start, end) = (x0 as i32, x1 as i32);
        for x in start..=end {
            let base = intery.floor();
            let frac = intery - base;
            let (px, py) = (x, base as i32);
            if steep {
                self.plot(buffers, colors, py, px, 1.0 - frac);
                self.plot(buffers, colors, py + 1, px, frac);
            } else {
                self.plot(buffers, colors, px, py, 1.0 - frac);
                self.plot(buffers, colors, px, py + 1, frac);
            }
            intery += gradient;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizontal_line_lights_every_column() {
        let (w, h) = (8, 4);
        let mut a = vec![0u32; w * h];
        let mut b = vec![0u32; w * h];
        let line = AntialiasedLine::new(w, h);
        line.draw_line(&mut [&mut a[..], &mut b[..]], &[0x00ff_ffff, 0x0000_00ff], (0, 1), (7, 1));
        for x in 0..w {
            assert_eq!(a[w + x], 0x00ff_ffff);
            assert_eq!(b[w + x], 0x0000_00ff);
        }
        assert!(a[..w].iter().all(|&p| p == 0));
    }

    #[test]
    fn endpoint_outside_draws_nothing() {
        let (w, h) = (8, 4);
        let mut a = vec![0u32; w * h];
        AntialiasedLine::new(w, h).draw_line(&mut [&mut a[..]], &[0xffff_ffff], (0, 0), (8, 3));
        assert!(a.iter().all(|&p| p == 0));
    }
}
