// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

mod scene;
mod settings;

use bevy_ecs::prelude::*;
use bevy_ecs::schedule::{IntoScheduleConfigs, Schedule};
use contact_engine::{PhysicsResource, PhysicsSystem, TimeResource};
use rand::{SeedableRng, rngs::StdRng};
use std::{env, path::PathBuf, process::ExitCode};

const BOX_COUNT: usize = 24;
const SIMULATED_SECONDS: f32 = 12.0;

fn main() -> ExitCode {
    env_logger::init();

    let explicit_config = env::args_os().nth(1).map(PathBuf::from);
    let config = settings::load_physics_config(explicit_config.as_deref());

    let mut world = World::new();
    world.insert_resource(PhysicsResource::new(config));
    world.insert_resource(TimeResource::default());

    let mut rng = StdRng::seed_from_u64(7);
    let spawned = scene::spawn_floor(&mut world)
        .and_then(|_| scene::spawn_falling_bodies(&mut world, &mut rng, BOX_COUNT));
    if let Err(e) = spawned {
        log::error!("Failed to build the scene: {e}");
        return ExitCode::FAILURE;
    }

    let mut schedule = Schedule::default();
    schedule.add_systems(
        (
            PhysicsSystem::push_transforms,
            PhysicsSystem::step,
            PhysicsSystem::pull_transforms,
            scene::report_progress,
        )
            .chain(),
    );

    let fixed_dt = world.resource::<TimeResource>().fixed_dt();
    let steps = (SIMULATED_SECONDS / fixed_dt).ceil() as u64;
    log::info!("Simulating {steps} steps of {:.4}s", fixed_dt);
    for _ in 0..steps {
        schedule.run(&mut world);
    }

    scene::log_final_state(&mut world);
    ExitCode::SUCCESS
}
