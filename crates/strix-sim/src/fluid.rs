//! Grid fluid.
//!
//! Collocated `width × height` grid carrying velocity (in cells per second)
//! and RGB dye. A step advects velocity semi-Lagrangian style, projects it to
//! be divergence free with Jacobi pressure iterations, then advects the dye.
//!
//! Dye is double buffered: readers always see `dye[dye_read]`, the step writes
//! into the other buffer and flips the index.

use glam::{Vec2, Vec3};

#[derive(Debug, Clone)]
pub struct FluidConfig {
    pub width: usize,
    pub height: usize,

    /// Velocity decay rate per second.
    pub velocity_dissipation: f32,

    /// Dye decay rate per second.
    pub dye_dissipation: f32,

    /// Jacobi iterations of the pressure solve.
    pub pressure_iterations: u32,

    /// Splat radius as a fraction of the grid width.
    pub splat_radius: f32,
}

impl Default for FluidConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            velocity_dissipation: 0.2,
            dye_dissipation: 1.0,
            pressure_iterations: 20,
            splat_radius: 0.025,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FluidSimulation {
    config: FluidConfig,
    velocity: Vec<Vec2>,
    scratch: Vec<Vec2>,
    pressure: Vec<f32>,
    pressure_next: Vec<f32>,
    divergence: Vec<f32>,
    dye: [Vec<Vec3>; 2],
    dye_read: usize,
}

impl FluidSimulation {
    pub fn new(mut config: FluidConfig) -> Self {
        config.width = config.width.max(1);
        config.height = config.height.max(1);
        let n = config.width * config.height;

        Self {
            config,
            velocity: vec![Vec2::ZERO; n],
            scratch: vec![Vec2::ZERO; n],
            pressure: vec![0.0; n],
            pressure_next: vec![0.0; n],
            divergence: vec![0.0; n],
            dye: [vec![Vec3::ZERO; n], vec![Vec3::ZERO; n]],
            dye_read: 0,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.config.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.config.height
    }

    #[inline]
    pub fn config(&self) -> &FluidConfig {
        &self.config
    }

    /// Index of the dye buffer that currently holds the readable state.
    #[inline]
    pub fn dye_read(&self) -> usize {
        self.dye_read
    }

    #[inline]
    pub fn dye(&self) -> &[Vec3] {
        &self.dye[self.dye_read]
    }

    #[inline]
    pub fn velocity(&self) -> &[Vec2] {
        &self.velocity
    }

    /// Adds a gaussian blob of velocity and dye.
    ///
    /// `point` is in normalized grid space (`[0, 1]²`, origin at cell 0),
    /// `force` in cells per second.
    pub fn splat(&mut self, point: Vec2, force: Vec2, color: Vec3) {
        let (w, h) = (self.config.width, self.config.height);
        let radius = (self.config.splat_radius * w as f32).max(0.5);
        let inv = 1.0 / (radius * radius);
        let centre = point * Vec2::new(w as f32, h as f32) - Vec2::splat(0.5);

        let read = self.dye_read;
        for y in 0..h {
            for x in 0..w {
                let d = Vec2::new(x as f32, y as f32) - centre;
                let falloff = (-d.length_squared() * inv).exp();
                let k = y * w + x;
                self.velocity[k] += force * falloff;
                self.dye[read][k] += color * falloff;
            }
        }
    }

    /// Advances the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let (w, h) = (self.config.width, self.config.height);

        // velocity self-advection
        let decay = 1.0 / (1.0 + self.config.velocity_dissipation * dt);
        for y in 0..h {
            for x in 0..w {
                let k = y * w + x;
                let back = Vec2::new(x as f32, y as f32) - self.velocity[k] * dt;
                self.scratch[k] = sample(&self.velocity, w, h, back) * decay;
            }
        }
        std::mem::swap(&mut self.velocity, &mut self.scratch);

        self.project();

        // dye advection into the write buffer
        let decay = 1.0 / (1.0 + self.config.dye_dissipation * dt);
        let read = self.dye_read;
        let write = 1 - read;
        let (a, b) = self.dye.split_at_mut(1);
        let (src, dst) = if read == 0 { (&a[0], &mut b[0]) } else { (&b[0], &mut a[0]) };
        for y in 0..h {
            for x in 0..w {
                let k = y * w + x;
                let back = Vec2::new(x as f32, y as f32) - self.velocity[k] * dt;
                dst[k] = sample(src, w, h, back) * decay;
            }
        }
        self.dye_read = write;
    }

    /// Largest absolute central-difference divergence of the velocity field.
    pub fn max_divergence(&self) -> f32 {
        let (w, h) = (self.config.width, self.config.height);
        let mut max = 0.0f32;
        for y in 0..h {
            for x in 0..w {
                max = max.max(divergence_at(&self.velocity, w, h, x, y).abs());
            }
        }
        max
    }

    /// Dye as tightly packed RGBA8, rows top to bottom.
    pub fn dye_rgba8(&self) -> Vec<u8> {
        let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
        let mut out = Vec::with_capacity(self.dye().len() * 4);
        for c in self.dye() {
            out.extend_from_slice(&[to_byte(c.x), to_byte(c.y), to_byte(c.z), 255]);
        }
        out
    }

    fn project(&mut self) {
        let (w, h) = (self.config.width, self.config.height);

        for y in 0..h {
            for x in 0..w {
                self.divergence[y * w + x] = divergence_at(&self.velocity, w, h, x, y);
            }
        }

        self.pressure.fill(0.0);
        for _ in 0..self.config.pressure_iterations {
            for y in 0..h {
                for x in 0..w {
                    let p = |dx: isize, dy: isize| self.pressure[clamped(w, h, x, y, dx, dy)];
                    let sum = p(-1, 0) + p(1, 0) + p(0, -1) + p(0, 1);
                    self.pressure_next[y * w + x] = (sum - self.divergence[y * w + x]) * 0.25;
                }
            }
            std::mem::swap(&mut self.pressure, &mut self.pressure_next);
        }

        for y in 0..h {
            for x in 0..w {
                let p = |dx: isize, dy: isize| self.pressure[clamped(w, h, x, y, dx, dy)];
                let gradient = Vec2::new(p(1, 0) - p(-1, 0), p(0, 1) - p(0, -1)) * 0.5;
                self.velocity[y * w + x] -= gradient;
            }
        }
    }
}

#[inline]
fn clamped(w: usize, h: usize, x: usize, y: usize, dx: isize, dy: isize) -> usize {
    let cx = (x as isize + dx).clamp(0, w as isize - 1) as usize;
    let cy = (y as isize + dy).clamp(0, h as isize - 1) as usize;
    cy * w + cx
}

fn divergence_at(v: &[Vec2], w: usize, h: usize, x: usize, y: usize) -> f32 {
    let l = v[clamped(w, h, x, y, -1, 0)].x;
    let r = v[clamped(w, h, x, y, 1, 0)].x;
    let b = v[clamped(w, h, x, y, 0, -1)].y;
    let t = v[clamped(w, h, x, y, 0, 1)].y;
    0.5 * ((r - l) + (t - b))
}

/// Bilinear sample with edge clamping.
fn sample<T>(field: &[T], w: usize, h: usize, at: Vec2) -> T
where
    T: Copy + std::ops::Mul<f32, Output = T> + std::ops::Add<Output = T>,
{
    let x = at.x.clamp(0.0, (w - 1) as f32);
    let y = at.y.clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let top = field[y0 * w + x0] * (1.0 - fx) + field[y0 * w + x1] * fx;
    let bottom = field[y1 * w + x0] * (1.0 - fx) + field[y1 * w + x1] * fx;
    top * (1.0 - fy) + bottom * fy
}
