//! Mass-spring cloth.
//!
//! The cloth is a `width × height` grid of particles. Row 0 is pinned and acts
//! as the anchor the rest of the sheet hangs from. Each step runs a damped
//! Verlet integration followed by a fixed number of pairwise distance
//! relaxation sweeps.
//!
//! Particle space has +Y pointing down: row 0 sits at `-extent / 2` and
//! gravity is a positive Y acceleration. Clip space has +Y up, so the default
//! [`ClothSimulation::model`] flips Y to put the pinned row at the top.

use glam::{Mat4, Vec2, Vec3, Vec4};

/// Neighbour slot of a particle link.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Link {
    Left = 0,
    Up = 1,
    Right = 2,
    Down = 3,
}

impl Link {
    pub const ALL: [Link; 4] = [Link::Left, Link::Up, Link::Right, Link::Down];
}

/// Cloth parameters.
///
/// The damping and relaxation count are real-time tuning knobs: more sweeps
/// make the sheet stiffer but never solve the constraints exactly.
#[derive(Debug, Clone)]
pub struct ClothConfig {
    /// Particles per row. Values below 2 are raised to 2.
    pub width: usize,

    /// Particle rows. Values below 2 are raised to 2.
    pub height: usize,

    /// Fraction of the implicit velocity removed every integration step.
    pub damping: f32,

    /// Constant acceleration added to every movable particle each step.
    pub gravity: Vec3,

    /// Relaxation sweeps run by [`ClothSimulation::step`].
    pub relaxation_iterations: u32,

    /// Side length of the square the grid spans, centred on the origin.
    pub extent: f32,
}

impl Default for ClothConfig {
    fn default() -> Self {
        Self {
            width: 32,
            height: 32,
            damping: 0.002,
            gravity: Vec3::new(0.0, 0.05, 0.0),
            relaxation_iterations: 4,
            extent: 2.0,
        }
    }
}

/// A single cloth particle.
///
/// Links are indices into the owning simulation's particle array; `None`
/// marks a grid edge and carries a rest distance of 0.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ClothParticle {
    pub position: Vec3,
    pub previous_position: Vec3,
    pub acceleration: Vec3,
    pub movable: bool,
    pub links: [Option<usize>; 4],
    pub rest_distances: [f32; 4],
}

impl ClothParticle {
    #[inline]
    pub fn link(&self, link: Link) -> Option<usize> {
        self.links[link as usize]
    }

    #[inline]
    pub fn rest_distance(&self, link: Link) -> f32 {
        self.rest_distances[link as usize]
    }
}

/// Maps particle space (+Y down) to clip space (+Y up).
pub const CLOTH_Y_FLIP: Mat4 = Mat4::from_cols(Vec4::X, Vec4::NEG_Y, Vec4::Z, Vec4::W);

/// Cloth state plus the transform used when it is drawn.
#[derive(Debug, Clone)]
pub struct ClothSimulation {
    config: ClothConfig,
    particles: Vec<ClothParticle>,

    /// Model transform applied by the renderer. Defaults to [`CLOTH_Y_FLIP`].
    pub model: Mat4,
}

impl ClothSimulation {
    /// Lays out the particle grid, links the 4-neighbourhood and pins row 0.
    pub fn new(mut config: ClothConfig) -> Self {
        if config.width < 2 || config.height < 2 {
            log::warn!(
                "cloth grid {}x{} is too small; clamping to at least 2x2",
                config.width,
                config.height
            );
            config.width = config.width.max(2);
            config.height = config.height.max(2);
        }

        let (w, h) = (config.width, config.height);
        let half = config.extent * 0.5;

        let mut particles = Vec::with_capacity(w * h);
        for i in 0..h {
            for j in 0..w {
                let x = config.extent * j as f32 / (w - 1) as f32 - half;
                let y = config.extent * i as f32 / (h - 1) as f32 - half;
                let position = Vec3::new(x, y, 0.0);
                particles.push(ClothParticle {
                    position,
                    previous_position: position,
                    acceleration: Vec3::ZERO,
                    movable: i != 0,
                    links: [None; 4],
                    rest_distances: [0.0; 4],
                });
            }
        }

        for i in 0..h {
            for j in 0..w {
                let k = i * w + j;
                let neighbours = [
                    (j > 0).then(|| k - 1),
                    (i > 0).then(|| k - w),
                    (j + 1 < w).then(|| k + 1),
                    (i + 1 < h).then(|| k + w),
                ];
                for (slot, neighbour) in neighbours.into_iter().enumerate() {
                    if let Some(n) = neighbour {
                        let rest = particles[k].position.distance(particles[n].position);
                        particles[k].links[slot] = Some(n);
                        particles[k].rest_distances[slot] = rest;
                    }
                }
            }
        }

        Self {
            config,
            particles,
            model: CLOTH_Y_FLIP,
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
    pub fn config(&self) -> &ClothConfig {
        &self.config
    }

    /// Particles in row-major order (`row * width + col`).
    #[inline]
    pub fn particles(&self) -> &[ClothParticle] {
        &self.particles
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.config.width + col
    }

    /// Accumulates an external acceleration on one particle until the next
    /// integration step.
    pub fn apply_force(&mut self, id: usize, acceleration: Vec3) {
        match self.particles.get_mut(id) {
            Some(p) => p.acceleration += acceleration,
            None => log::warn!("apply_force: particle {id} out of range"),
        }
    }

    /// Integrates every movable particle once.
    ///
    /// Implicit velocity is `position - previous_position`, damped, then
    /// advanced by the accumulated acceleration (gravity included) times `dt`.
    /// Accumulated acceleration is cleared afterwards.
    pub fn integrate(&mut self, dt: f32) {
        let keep = 1.0 - self.config.damping;
        let gravity = self.config.gravity;

        for p in &mut self.particles {
            if p.movable {
                p.acceleration += gravity;

                let velocity = (p.position - p.previous_position) * keep;
                let delta = velocity + p.acceleration * dt;

                p.previous_position = p.position;
                p.position += delta;
            }
            p.acceleration = Vec3::ZERO;
        }
    }

    /// Runs `iterations` Gauss-Seidel sweeps over every link.
    ///
    /// Each movable particle moves half of the correction towards its rest
    /// distance; a movable neighbour takes the other half. Pinned particles are
    /// never moved but still pull on their neighbours.
    pub fn relax(&mut self, iterations: u32) {
        for _ in 0..iterations {
            for i in 0..self.particles.len() {
                if !self.particles[i].movable {
                    continue;
                }

                for slot in 0..4 {
                    let Some(n) = self.particles[i].links[slot] else { continue };

                    let delta = self.particles[n].position - self.particles[i].position;
                    let distance = delta.length();
                    if distance <= f32::EPSILON {
                        continue;
                    }

                    let factor = 1.0 - self.particles[i].rest_distances[slot] / distance;
                    let correction = delta * factor * 0.5;

                    self.particles[i].position += correction;
                    if self.particles[n].movable {
                        self.particles[n].position -= correction;
                    }
                }
            }
        }
    }

    /// One frame: integration followed by the configured relaxation sweeps.
    pub fn step(&mut self, dt: f32) {
        self.integrate(dt);
        self.relax(self.config.relaxation_iterations);
    }

    /// Moves a particle in the XY plane, keeping its depth.
    ///
    /// Returns `false` (and leaves the particle untouched) when the particle is
    /// pinned or `id` is out of range.
    pub fn set_particle_position(&mut self, id: usize, position: Vec2) -> bool {
        let Some(p) = self.particles.get_mut(id) else {
            log::warn!("set_particle_position: particle {id} out of range");
            return false;
        };
        if !p.movable {
            return false;
        }
        p.position.x = position.x;
        p.position.y = position.y;
        true
    }

    /// Index of the particle closest to `point` in the XY plane.
    ///
    /// Ties resolve to the lowest index.
    pub fn select_nearest(&self, point: Vec2) -> usize {
        let mut best = 0;
        let mut best_distance = f32::INFINITY;

        for (i, p) in self.particles.iter().enumerate() {
            let distance = point.distance(p.position.truncate());
            if distance < best_distance {
                best = i;
                best_distance = distance;
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid(w: usize, h: usize) -> ClothSimulation {
        ClothSimulation::new(ClothConfig {
            width: w,
            height: h,
            ..ClothConfig::default()
        })
    }

    // ── layout ────────────────────────────────────────────────────────────

    #[test]
    fn grid_spans_extent() {
        let cloth = grid(2, 2);
        let p: Vec<Vec3> = cloth.particles().iter().map(|p| p.position).collect();
        assert_eq!(p[0], Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(p[1], Vec3::new(1.0, -1.0, 0.0));
        assert_eq!(p[2], Vec3::new(-1.0, 1.0, 0.0));
        assert_eq!(p[3], Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn only_first_row_is_pinned() {
        let cloth = grid(4, 3);
        for (k, p) in cloth.particles().iter().enumerate() {
            assert_eq!(p.movable, k >= 4, "particle {k}");
        }
    }

    #[test]
    fn default_model_puts_pinned_row_on_top() {
        let cloth = grid(3, 3);
        let top = cloth.model.transform_point3(cloth.particles()[0].position);
        let bottom = cloth.model.transform_point3(cloth.particles()[6].position);
        assert_eq!(top.y, 1.0);
        assert_eq!(bottom.y, -1.0);
    }

    #[test]
    fn degenerate_grid_is_clamped() {
        let cloth = grid(1, 0);
        assert_eq!((cloth.width(), cloth.height()), (2, 2));
    }

    // ── links ─────────────────────────────────────────────────────────────

    #[test]
    fn links_follow_four_neighbourhood() {
        let cloth = grid(4, 4);
        for i in 0..4 {
            for j in 0..4 {
                let p = &cloth.particles()[cloth.index(i, j)];
                assert_eq!(p.link(Link::Left), (j > 0).then(|| cloth.index(i, j - 1)));
                assert_eq!(p.link(Link::Up), (i > 0).then(|| cloth.index(i - 1, j)));
                assert_eq!(p.link(Link::Right), (j < 3).then(|| cloth.index(i, j + 1)));
                assert_eq!(p.link(Link::Down), (i < 3).then(|| cloth.index(i + 1, j)));
            }
        }
    }

    #[test]
    fn rest_distances_match_initial_layout_and_never_change() {
        let mut cloth = grid(4, 4);
        let initial: Vec<[f32; 4]> = cloth.particles().iter().map(|p| p.rest_distances).collect();

        for p in cloth.particles() {
            for link in Link::ALL {
                match p.link(link) {
                    Some(n) => assert_relative_eq!(
                        p.rest_distance(link),
                        p.position.distance(cloth.particles()[n].position)
                    ),
                    None => assert_eq!(p.rest_distance(link), 0.0),
                }
            }
        }

        for _ in 0..20 {
            cloth.step(1.0 / 60.0);
        }
        let after: Vec<[f32; 4]> = cloth.particles().iter().map(|p| p.rest_distances).collect();
        assert_eq!(initial, after);
    }

    // ── integration ───────────────────────────────────────────────────────

    #[test]
    fn gravity_pulls_free_row_down_monotonically() {
        let mut cloth = ClothSimulation::new(ClothConfig {
            width: 2,
            height: 2,
            relaxation_iterations: 0,
            ..ClothConfig::default()
        });
        let pinned: Vec<Vec3> = cloth.particles()[..2].iter().map(|p| p.position).collect();
        let mut last: Vec<f32> = cloth.particles()[2..].iter().map(|p| p.position.y).collect();

        for _ in 0..10 {
            cloth.step(1.0 / 60.0);
            for (k, p) in cloth.particles()[2..].iter().enumerate() {
                assert!(p.position.y > last[k], "row 1 particle {k} did not move down");
                last[k] = p.position.y;
            }
        }

        let now: Vec<Vec3> = cloth.particles()[..2].iter().map(|p| p.position).collect();
        assert_eq!(pinned, now);
    }

    #[test]
    fn pinned_particles_never_move() {
        let mut cloth = grid(4, 4);
        let before: Vec<Vec3> = cloth.particles()[..4].iter().map(|p| p.position).collect();

        for id in 4..16 {
            cloth.apply_force(id, Vec3::new(0.3, -2.0, 0.1));
        }
        for _ in 0..50 {
            cloth.step(1.0 / 60.0);
        }

        let after: Vec<Vec3> = cloth.particles()[..4].iter().map(|p| p.position).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn external_force_is_consumed_by_one_step() {
        let mut cloth = ClothSimulation::new(ClothConfig {
            width: 2,
            height: 2,
            gravity: Vec3::ZERO,
            relaxation_iterations: 0,
            damping: 0.0,
            ..ClothConfig::default()
        });
        cloth.apply_force(3, Vec3::new(6.0, 0.0, 0.0));
        cloth.integrate(0.5);

        let p = cloth.particles()[3];
        assert_relative_eq!(p.position.x, 4.0);
        assert_eq!(p.acceleration, Vec3::ZERO);
    }

    // ── relaxation ────────────────────────────────────────────────────────

    #[test]
    fn relaxation_pulls_stretched_link_towards_rest() {
        let mut cloth = grid(2, 2);
        cloth.set_particle_position(3, Vec2::new(3.0, 1.0));
        let rest = cloth.particles()[3].rest_distance(Link::Left);
        let stretched = cloth.particles()[3].position.distance(cloth.particles()[2].position);

        cloth.relax(4);

        let relaxed = cloth.particles()[3].position.distance(cloth.particles()[2].position);
        assert!((relaxed - rest).abs() < (stretched - rest).abs());
    }

    #[test]
    fn coincident_particles_do_not_produce_nan() {
        let mut cloth = grid(2, 2);
        cloth.set_particle_position(3, Vec2::new(-1.0, 1.0));
        cloth.relax(4);
        assert!(cloth.particles().iter().all(|p| p.position.is_finite()));
    }

    // ── interaction ───────────────────────────────────────────────────────

    #[test]
    fn set_position_ignores_pinned_particles() {
        let mut cloth = grid(2, 2);
        assert!(!cloth.set_particle_position(0, Vec2::new(5.0, 5.0)));
        assert_eq!(cloth.particles()[0].position, Vec3::new(-1.0, -1.0, 0.0));
        assert!(!cloth.set_particle_position(99, Vec2::ZERO));
    }

    #[test]
    fn set_position_moves_xy_only() {
        let mut cloth = grid(2, 2);
        cloth.particles[2].position.z = 0.25;
        assert!(cloth.set_particle_position(2, Vec2::new(0.5, 0.75)));
        assert_eq!(cloth.particles()[2].position, Vec3::new(0.5, 0.75, 0.25));
    }

    #[test]
    fn select_nearest_picks_closest_corner() {
        let cloth = grid(2, 2);
        assert_eq!(cloth.select_nearest(Vec2::new(0.9, 0.9)), 3);
        assert_eq!(cloth.select_nearest(Vec2::new(-0.8, -0.7)), 0);
    }

    #[test]
    fn select_nearest_breaks_ties_by_lowest_index() {
        let cloth = grid(2, 2);
        assert_eq!(cloth.select_nearest(Vec2::ZERO), 0);
        assert_eq!(cloth.select_nearest(Vec2::new(0.0, 1.0)), 2);
    }
}
