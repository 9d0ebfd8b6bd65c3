// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use contact_engine::PhysicsConfig;
use dirs_next::config_dir;
use std::path::{Path, PathBuf};

/// `<config_dir>/contact_engine/physics.toml`, if the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("contact_engine").join("physics.toml"))
}

/// Loads the physics config from `explicit` if given, else from the user
/// config file. Falls back to defaults when neither yields a valid file.
pub fn load_physics_config(explicit: Option<&Path>) -> PhysicsConfig {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match user_config_path() {
            Some(path) if path.exists() => path,
            _ => {
                log::info!("No physics config found. Using defaults.");
                return PhysicsConfig::default();
            }
        },
    };

    match PhysicsConfig::load_from_file(&path) {
        Ok(config) => {
            log::info!("Loaded physics config from {}", path.display());
            config
        }
        Err(e) => {
            log::warn!(
                "Failed to load physics config {}: {}. Using defaults.",
                path.display(),
                e
            );
            PhysicsConfig::default()
        }
    }
}
