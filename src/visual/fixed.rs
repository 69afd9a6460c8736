//! 12-bit fixed point and the similitude maps the IFS fractal is built from.

pub type Fixed = i32;

pub const FIX: u32 = 12;
pub const UNIT: Fixed = 1 << FIX;

#[inline]
pub fn to_fixed(x: f32) -> Fixed {
    (UNIT as f32 * x) as Fixed
}

/// Truncating (arithmetic shift) division by one unit.
#[inline]
pub fn div_by_unit(x: Fixed) -> Fixed {
    x >> FIX
}

#[inline]
pub fn div_by_2units(x: Fixed) -> Fixed {
    x >> (FIX + 1)
}

/// One affine branch of the fractal: a centre, two radii and two rotations.
///
/// The float fields are the source of truth and are what gets blended between generations.
/// The fixed-point coefficients are a cache filled by [`Similitude::prepare`] before each
/// trace pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Similitude {
    pub c_x: f32,
    pub c_y: f32,
    pub r: f32,
    pub r2: f32,
    pub a: f32,
    pub a2: f32,
    pub ct: Fixed,
    pub st: Fixed,
    pub ct2: Fixed,
    pub st2: Fixed,
    pub cx: Fixed,
    pub cy: Fixed,
    pub rr: Fixed,
    pub rr2: Fixed,
}

impl Similitude {
    pub fn prepare(&mut self) {
        self.cx = to_fixed(self.c_x);
        self.cy = to_fixed(self.c_y);
        self.ct = to_fixed(self.a.cos());
        self.st = to_fixed(self.a.sin());
        self.ct2 = to_fixed(self.a2.cos());
        self.st2 = to_fixed(self.a2.sin());
        self.rr = to_fixed(self.r);
        self.rr2 = to_fixed(self.r2);
    }

    /// Zeroes the cached coefficients; the next `prepare` refills them.
    pub fn clear_fixed(&mut self) {
        self.ct = 0;
        self.st = 0;
        self.ct2 = 0;
        self.st2 = 0;
        self.cx = 0;
        self.cy = 0;
        self.rr = 0;
        self.rr2 = 0;
    }

    /// Applies the map to a fixed-point point. Wrapping arithmetic keeps wild generations
    /// from trapping; they simply land off screen.
    #[inline]
    pub fn transform(&self, x: Fixed, y: Fixed) -> (Fixed, Fixed) {
        let xo = div_by_unit(x.wrapping_sub(self.cx).wrapping_mul(self.rr));
        let yo = div_by_unit(y.wrapping_sub(self.cy).wrapping_mul(self.rr));

        let xx = div_by_unit(xo.wrapping_sub(self.cx).wrapping_mul(self.rr2));
        let yy = div_by_unit(yo.wrapping_neg().wrapping_sub(self.cy).wrapping_mul(self.rr2));

        let nx = xo
            .wrapping_mul(self.ct)
            .wrapping_sub(yo.wrapping_mul(self.st))
            .wrapping_add(xx.wrapping_mul(self.ct2))
            .wrapping_sub(yy.wrapping_mul(self.st2));
        let ny = xo
            .wrapping_mul(self.st)
            .wrapping_add(yo.wrapping_mul(self.ct))
            .wrapping_add(xx.wrapping_mul(self.st2))
            .wrapping_add(yy.wrapping_mul(self.ct2));

        (
            div_by_unit(nx).wrapping_add(self.cx),
            div_by_unit(ny).wrapping_add(self.cy),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simi(r: f32, a: f32) -> Similitude {
        let mut s = Similitude {
            r,
            a,
            ..Similitude::default()
        };
        s.prepare();
        s
    }

    #[test]
    fn shifts_truncate_toward_negative_infinity() {
        assert_eq!(div_by_unit(UNIT * 3 + 5), 3);
        assert_eq!(div_by_unit(-1), -1);
        assert_eq!(div_by_2units(UNIT * 2), 1);
    }

    #[test]
    fn unit_radius_no_rotation_is_identity() {
        let s = simi(1.0, 0.0);
        assert_eq!(s.transform(1000, -2000), (1000, -2000));
    }

    #[test]
    fn quarter_turn_swaps_axes() {
        let s = simi(1.0, std::f32::consts::FRAC_PI_2);
        let (x, y) = s.transform(UNIT, 0);
        assert!(x.abs() <= 1, "x = {x}");
        assert_eq!(y, UNIT);
    }

    #[test]
    fn half_radius_halves() {
        let s = simi(0.5, 0.0);
        assert_eq!(s.transform(UNIT, UNIT), (UNIT / 2, UNIT / 2));
    }
}
