// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadphaseSettings {
    /// Margin added around leaf AABBs so small motions don't reinsert.
    pub aabb_margin: f32,
    /// Slack used by AABB overlap tests during tree queries.
    pub query_slack: f32,
    /// Apply SAH tree rotations while refitting.
    pub rebalance: bool,
    /// Hulls with more points than this get a cheap OBB rejection test first.
    pub large_mesh_threshold: usize,
}

impl Default for BroadphaseSettings {
    fn default() -> Self {
        Self {
            aabb_margin: 0.1,
            query_slack: 0.01,
            rebalance: true,
            large_mesh_threshold: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrowphaseSettings {
    pub sat_parallel_epsilon: f32,
    pub gjk_max_iterations: usize,
    pub gjk_epsilon: f32,
    pub epa_max_iterations: usize,
    pub epa_tolerance: f32,
    pub epa_visibility_epsilon: f32,
    /// Points closer than this along the contact normal count as one feature.
    pub feature_tolerance: f32,
    pub clip_epsilon: f32,
}

impl Default for NarrowphaseSettings {
    fn default() -> Self {
        Self {
            sat_parallel_epsilon: 1e-6,
            gjk_max_iterations: 64,
            gjk_epsilon: 1e-6,
            epa_max_iterations: 128,
            epa_tolerance: 1e-4,
            epa_visibility_epsilon: 1e-6,
            feature_tolerance: 1e-3,
            clip_epsilon: 1e-6,
        }
    }
}

/// How two per-collider coefficients are merged into one per contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineRule {
    Minimum,
    Maximum,
    Average,
    Multiply,
    GeometricMean,
}

impl CombineRule {
    pub fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            CombineRule::Minimum => a.min(b),
            CombineRule::Maximum => a.max(b),
            CombineRule::Average => 0.5 * (a + b),
            CombineRule::Multiply => a * b,
            CombineRule::GeometricMean => (a * b).sqrt(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Velocity passes over every contact of the step.
    pub iterations: usize,
    /// Position passes over every contact of the step.
    pub position_iterations: usize,
    /// Approach speed below which contacts don't bounce.
    pub restitution_threshold: f32,
    /// Fraction of the remaining penetration removed per step.
    pub position_correction: f32,
    pub penetration_slop: f32,
    /// Share of last step's impulses applied before solving; 0 disables warm starting.
    pub warm_start_factor: f32,
    /// Velocity change above which a collider counts as hard collided.
    pub hard_collision_threshold: f32,
    pub restitution_rule: CombineRule,
    pub friction_rule: CombineRule,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            iterations: 10,
            position_iterations: 4,
            restitution_threshold: 0.5,
            position_correction: 1.0,
            penetration_slop: 0.0005,
            warm_start_factor: 0.9,
            hard_collision_threshold: 5.0,
            restitution_rule: CombineRule::Minimum,
            friction_rule: CombineRule::GeometricMean,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub broadphase: BroadphaseSettings,
    pub narrowphase: NarrowphaseSettings,
    pub solver: SolverSettings,
    pub gravity: [f32; 3],
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            broadphase: BroadphaseSettings::default(),
            narrowphase: NarrowphaseSettings::default(),
            solver: SolverSettings::default(),
            gravity: [0.0, -9.81, 0.0],
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Deserialization Error: {0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("Serialization Error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid physics setting: {0}")]
    Invalid(String),
}

impl PhysicsConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PhysicsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config from a toml file. Missing keys fall back to defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Saves the config, creating the parent directory if needed.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn non_negative(name: &str, value: f32) -> Result<(), ConfigError> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!(
                    "{name} must be finite and non-negative, got {value}"
                )))
            }
        }

        fn positive(name: &str, value: f32) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!(
                    "{name} must be finite and positive, got {value}"
                )))
            }
        }

        let broad = &self.broadphase;
        non_negative("broadphase.aabb_margin", broad.aabb_margin)?;
        non_negative("broadphase.query_slack", broad.query_slack)?;

        let narrow = &self.narrowphase;
        positive("narrowphase.sat_parallel_epsilon", narrow.sat_parallel_epsilon)?;
        positive("narrowphase.gjk_epsilon", narrow.gjk_epsilon)?;
        positive("narrowphase.epa_tolerance", narrow.epa_tolerance)?;
        non_negative("narrowphase.epa_visibility_epsilon", narrow.epa_visibility_epsilon)?;
        non_negative("narrowphase.feature_tolerance", narrow.feature_tolerance)?;
        non_negative("narrowphase.clip_epsilon", narrow.clip_epsilon)?;
        if narrow.gjk_max_iterations == 0 || narrow.epa_max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "narrowphase iteration limits must be at least 1".to_string(),
            ));
        }

        let solver = &self.solver;
        non_negative("solver.restitution_threshold", solver.restitution_threshold)?;
        non_negative("solver.penetration_slop", solver.penetration_slop)?;
        non_negative("solver.hard_collision_threshold", solver.hard_collision_threshold)?;
        for (name, value) in [
            ("solver.position_correction", solver.position_correction),
            ("solver.warm_start_factor", solver.warm_start_factor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if solver.position_iterations == 0 {
            return Err(ConfigError::Invalid(
                "solver.position_iterations must be at least 1".to_string(),
            ));
        }

        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "gravity must be finite, got {:?}",
                self.gravity
            )));
        }

        Ok(())
    }
}
