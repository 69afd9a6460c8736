use crate::color::{color_mix, ColorGroup};
use crate::draw::LineDrawer;
use std::f32::consts::FRAC_PI_2;
use std::fmt;
use std::rc::Rc;

/// Screen coordinate given to vertices that must not be drawn.
pub const OFF_SCREEN: V2d = V2d { x: -666, y: -666 };

/// Vertices closer than this to the camera plane are not projected.
pub const NEAR_PLANE: f32 = 2.0;

const BASE_ROW_LERP: f32 = 0.8;
const OWN_ROW_WEIGHT: f32 = 0.255;
const ROW_BEHIND_WEIGHT: f32 = 0.85;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct V3d {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl V3d {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Rotation about the Y axis.
    #[inline]
    pub fn rotate_y(self, sina: f32, cosa: f32) -> Self {
        Self {
            x: self.x * cosa - self.z * sina,
            y: self.y,
            z: self.x * sina + self.z * cosa,
        }
    }

    #[inline]
    pub fn translate(self, by: V3d) -> Self {
        Self {
            x: self.x + by.x,
            y: self.y + by.y,
            z: self.z + by.z,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct V2d {
    pub x: i32,
    pub y: i32,
}

impl V2d {
    pub fn is_off_screen(self) -> bool {
        self == OFF_SCREEN
    }
}

/// Perspective projection onto a `width` x `height` screen.
pub fn project(v: V3d, width: usize, height: usize, distance: f32) -> V2d {
    if v.z.is_nan() || v.z <= NEAR_PLANE {
        return OFF_SCREEN;
    }
    let xp = distance * v.x / v.z;
    let yp = distance * v.y / v.z;
    if !xp.is_finite() || !yp.is_finite() {
        return OFF_SCREEN;
    }
    V2d {
        x: xp as i32 + (width >> 1) as i32,
        y: -(yp as i32) + (height >> 1) as i32,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    ZeroDimension {
        num_x: usize,
        num_z: usize,
    },
    DepthBoundsMismatch {
        num_x: usize,
        mins: usize,
        maxs: usize,
    },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroDimension { num_x, num_z } => {
                write!(f, "grid needs at least 2x2 vertices, got {num_x}x{num_z}")
            }
            Self::DepthBoundsMismatch { num_x, mins, maxs } => write!(
                f,
                "grid has {num_x} columns but {mins} depth minimums and {maxs} depth maximums"
            ),
        }
    }
}

impl std::error::Error for GridError {}

/// Picks the colour pair of one grid segment.
pub trait LineColorer {
    /// Called before each column is walked.
    fn reset(&mut self, _num_z: usize) {}

    /// `(front, back)` colours for the segment ending at row `z` of column `x`.
    fn color_mix(&mut self, x: usize, z: usize, mod_color: u32, mod_color_low: u32) -> (u32, u32);
}

/// Every segment gets the frame's modulation colours unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TwoToneColorer;

impl LineColorer for TwoToneColorer {
    fn color_mix(&mut self, _x: usize, _z: usize, mod_color: u32, mod_color_low: u32) -> (u32, u32) {
        (mod_color, mod_color_low)
    }
}

/// Colours a tentacle along its length from a colour group, with a dark head.
pub struct TentacleColorer {
    group: Rc<dyn ColorGroup>,
    num_z: usize,
    head_len: usize,
    head_color: u32,
    head_color_low: u32,
}

impl TentacleColorer {
    pub const HEAD_LEN: usize = 3;
    const GROUP_WEIGHT: f32 = 0.5;

    pub fn new(group: Rc<dyn ColorGroup>, head_color: u32, head_color_low: u32) -> Self {
        Self {
            group,
            num_z: 1,
            head_len: Self::HEAD_LEN,
            head_color,
            head_color_low,
        }
    }

    pub fn set_group(&mut self, group: Rc<dyn ColorGroup>) {
        self.group = group;
    }

    pub fn group_name(&self) -> &str {
        self.group.name()
    }

    fn segment_color(&self, z: usize) -> u32 {
        let n = self.group.num_colors();
        self.group.color(z * n / self.num_z.max(1))
    }
}

impl LineColorer for TentacleColorer {
    fn reset(&mut self, num_z: usize) {
        self.num_z = num_z;
    }

    fn color_mix(&mut self, _x: usize, z: usize, mod_color: u32, mod_color_low: u32) -> (u32, u32) {
        if z < self.head_len {
            return (self.head_color, self.head_color_low);
        }
        let seg = self.segment_color(z);
        (
            color_mix(mod_color, seg, Self::GROUP_WEIGHT),
            color_mix(mod_color_low, seg, Self::GROUP_WEIGHT / 2.0),
        )
    }
}

/// A `num_x` by `num_z` vertex mesh. Row `z = 0` is the base row fed with external values.
#[derive(Debug, Clone)]
pub struct Grid3D {
    num_x: usize,
    num_z: usize,
    center: V3d,
    vertex: Vec<V3d>,
    svertex: Vec<V3d>,
    projected: Vec<V2d>,
}

impl Grid3D {
    /// Row widths run from `x_width_min` at `z = 0` to `x_width_max` at the last row; column
    /// `x` spans depth `zdepth_mins[x]..=zdepth_maxs[x]`.
    pub fn new(
        center: V3d,
        x_width_min: f32,
        x_width_max: f32,
        num_x: usize,
        zdepth_mins: &[f32],
        zdepth_maxs: &[f32],
        num_z: usize,
    ) -> Result<Self, GridError> {
        if num_x < 2 || num_z < 2 {
            return Err(GridError::ZeroDimension { num_x, num_z });
        }
        if zdepth_mins.len() != num_x || zdepth_maxs.len() != num_x {
            return Err(GridError::DepthBoundsMismatch {
                num_x,
                mins: zdepth_mins.len(),
                maxs: zdepth_maxs.len(),
            });
        }

        let mut vertex = vec![V3d::default(); num_x * num_z];
        let x_width_step = (x_width_max - x_width_min) / (num_z - 1) as f32;
        for nz in 0..num_z {
            let x_width = x_width_min + x_width_step * nz as f32;
            let x_step = x_width / (num_x - 1) as f32;
            for nx in 0..num_x {
                vertex[nz * num_x + nx].x = -x_width / 2.0 + x_step * nx as f32;
            }
        }
        for nx in 0..num_x {
            let z_step = (zdepth_maxs[nx] - zdepth_mins[nx]) / (num_z - 1) as f32;
            for nz in 0..num_z {
                vertex[nz * num_x + nx].z = zdepth_mins[nx] + z_step * nz as f32;
            }
        }

        Ok(Self {
            num_x,
            num_z,
            center,
            svertex: vertex.clone(),
            projected: vec![OFF_SCREEN; vertex.len()],
            vertex,
        })
    }

    #[inline]
    pub fn index(&self, x: usize, z: usize) -> usize {
        z * self.num_x + x
    }

    pub fn num_x(&self) -> usize {
        self.num_x
    }

    pub fn num_z(&self) -> usize {
        self.num_z
    }

    pub fn vertices(&self) -> &[V3d] {
        &self.vertex
    }

    pub fn transformed(&self) -> &[V3d] {
        &self.svertex
    }

    pub fn set_height(&mut self, x: usize, z: usize, y: f32) {
        let i = self.index(x, z);
        self.vertex[i].y = y;
    }

    /// Propagates the base row outward and moves every vertex into camera space.
    pub fn update(&mut self, angle: f32, vals: Option<&[f32]>, dist: f32) {
        if let Some(vals) = vals {
            for (v, &val) in self.vertex.iter_mut().zip(vals).take(self.num_x) {
                v.y = v.y * (1.0 - BASE_ROW_LERP) + val * BASE_ROW_LERP;
            }
        }
        for i in self.num_x..self.vertex.len() {
            let behind = self.vertex[i - self.num_x].y;
            let own = &mut self.vertex[i].y;
            *own = *own * OWN_ROW_WEIGHT + behind * ROW_BEHIND_WEIGHT;
        }

        let mut cam = self.center;
        cam.z += dist;
        cam.y += 2.0 * (-(angle - FRAC_PI_2) / 4.3).sin();

        let (sina, cosa) = angle.sin_cos();
        for (dst, src) in self.svertex.iter_mut().zip(&self.vertex) {
            *dst = src.rotate_y(sina, cosa).translate(cam);
        }
    }

    /// Draws every column as a polyline: bright colour into `front`, dim into `back`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &mut self,
        front: &mut [u32],
        back: &mut [u32],
        width: usize,
        height: usize,
        distance: f32,
        colorer: &mut dyn LineColorer,
        line: &dyn LineDrawer,
        mod_color: u32,
        mod_color_low: u32,
    ) {
        for (p, v) in self.projected.iter_mut().zip(&self.svertex) {
            *p = project(*v, width, height, distance);
        }

        for x in 0..self.num_x {
            let mut prev = self.projected[x];
            colorer.reset(self.num_z);
            for z in 1..self.num_z {
                let cur = self.projected[self.index(x, z)];
                if cur == prev {
                    continue;
                }
                if !cur.is_off_screen() && !prev.is_off_screen() {
                    let (color, color_low) = colorer.color_mix(x, z, mod_color, mod_color_low);
                    line.draw_line(
                        &mut [&mut *front, &mut *back],
                        &[color, color_low],
                        (prev.x, prev.y),
                        (cur.x, cur.y),
                    );
                }
                prev = cur;
            }
        }
    }
}
