/// Fixed-timestep accumulator for the simulations.
///
/// Frame deltas are accumulated and drained in whole steps, so cloth and
/// fluid advance at the same rate regardless of frame rate. At most
/// `max_steps` run per frame; the excess is dropped.
#[derive(Debug, Clone)]
pub struct FixedStep {
    step: f32,
    max_steps: u32,
    accumulator: f32,
}

impl FixedStep {
    pub fn new(step: f32, max_steps: u32) -> Self {
        Self {
            step: step.max(f32::EPSILON),
            max_steps: max_steps.max(1),
            accumulator: 0.0,
        }
    }

    #[inline]
    pub fn step(&self) -> f32 {
        self.step
    }

    /// Adds `dt` and returns how many steps to run this frame.
    pub fn advance(&mut self, dt: f32) -> u32 {
        self.accumulator += dt.max(0.0);
        let mut steps = 0;
        while self.accumulator >= self.step && steps < self.max_steps {
            self.accumulator -= self.step;
            steps += 1;
        }
        if steps == self.max_steps && self.accumulator >= self.step {
            log::debug!("fixed step dropped {:.3}s of backlog", self.accumulator);
            self.accumulator %= self.step;
        }
        steps
    }

    /// Fraction of a step left in the accumulator, for interpolation.
    #[inline]
    pub fn alpha(&self) -> f32 {
        self.accumulator / self.step
    }
}

impl Default for FixedStep {
    /// 60 Hz, at most 4 steps per frame.
    fn default() -> Self {
        Self::new(1.0 / 60.0, 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn accumulates_partial_steps() {
        let mut fixed = FixedStep::new(0.01, 8);
        assert_eq!(fixed.advance(0.004), 0);
        assert_eq!(fixed.advance(0.004), 0);
        assert_eq!(fixed.advance(0.004), 1);
        assert_relative_eq!(fixed.alpha(), 0.2, epsilon = 1e-4);
    }

    #[test]
    fn backlog_is_capped() {
        let mut fixed = FixedStep::new(0.01, 4);
        assert_eq!(fixed.advance(1.0), 4);
        assert!(fixed.alpha() < 1.0);
        assert_eq!(fixed.advance(0.0), 0);
    }

    #[test]
    fn negative_dt_is_ignored() {
        let mut fixed = FixedStep::default();
        assert_eq!(fixed.advance(-1.0), 0);
        assert_eq!(fixed.alpha(), 0.0);
    }
}
