// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use bevy_ecs::prelude::*;

#[derive(Resource, Debug, Clone)]
pub struct TimeResource {
    simulation_fixed_dt: f32,
    total_time: f64,
    step_count: u64,
}

impl Default for TimeResource {
    fn default() -> Self {
        TimeResource {
            simulation_fixed_dt: 1.0 / 60.0, // Default to 60 Hz
            total_time: 0.0,
            step_count: 0,
        }
    }
}

impl TimeResource {
    pub fn new(simulation_fixed_dt: f32) -> Self {
        TimeResource {
            simulation_fixed_dt,
            ..Default::default()
        }
    }

    pub fn set_simulation_fixed_dt(&mut self, fixed_dt: f32) {
        self.simulation_fixed_dt = fixed_dt;
    }

    pub fn simulation_fixed_dt(&self) -> f32 {
        self.simulation_fixed_dt
    }

    /// Alias for simulation_fixed_dt, for convenience
    pub fn fixed_dt(&self) -> f32 {
        self.simulation_fixed_dt
    }

    /// Records one completed fixed step.
    pub fn advance(&mut self) {
        self.total_time += self.simulation_fixed_dt as f64;
        self.step_count += 1;
    }

    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn advance_accumulates_fixed_steps() {
        let mut time = TimeResource::new(0.25);
        for _ in 0..4 {
            time.advance();
        }
        assert_eq!(time.step_count(), 4);
        assert_approx_eq!(time.total_time(), 1.0, 1e-9);
    }
}
