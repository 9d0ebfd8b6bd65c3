// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use glam::{Mat3, Vec3};
use slotmap::{SecondaryMap, SlotMap};
use std::{collections::HashMap, time::Duration};

use crate::{
    config::PhysicsConfig,
    error::{ManifoldError, PhysicsError},
    handles::{BodyHandle, ColliderHandle},
    physics::{
        collider::{Collider, ColliderDesc},
        dynamic_aabb_tree::DynamicAabbTree,
        epa::{EpaParams, penetration},
        gjk::GjkParams,
        impulse::{
            CachedImpulse, CombinedMaterial, ManifoldConstraint, correct_positions, solve_velocities,
            warm_start,
        },
        inertia::{box_inertia, invert_inertia, mesh_mass_properties},
        manifold::{ContactFeature, ContactManifold, ManifoldParams, build_manifold},
        rigid_body::{RigidBody, RigidBodySet},
        sat::{collide_obb_obb, obb_obb_intersects},
        shape::ColliderShape,
    },
    utils::scope_timer::ScopeTimer,
};

/// Counters and phase timings of one `resolve_collisions` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CollisionStats {
    pub colliders: usize,
    pub candidate_pairs: usize,
    /// Pairs the narrow phase confirmed as touching.
    pub contacts: usize,
    pub manifold_failures: usize,
    pub broad_phase: Duration,
    pub narrow_phase: Duration,
    pub resolution: Duration,
}

/// Narrow phase result before contact points are known.
#[derive(Debug, Clone, Copy)]
struct NarrowHit {
    normal: Vec3,
    depth: f32,
    feature: ContactFeature,
}

struct PairContact {
    a: ColliderHandle,
    b: ColliderHandle,
    normal: Vec3,
    manifold: Result<ContactManifold, ManifoldError>,
}

/// Owns every collider and the broad phase tree, and runs the per-step
/// detection and response pass.
pub struct ColliderHandler {
    colliders: SlotMap<ColliderHandle, Collider>,
    tree: DynamicAabbTree,
    config: PhysicsConfig,
    pairs: Vec<(ColliderHandle, ColliderHandle)>,
    /// Impulses each touching pair ended the last step with.
    impulse_cache: HashMap<(ColliderHandle, ColliderHandle), Vec<CachedImpulse>>,
}

impl Default for ColliderHandler {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl ColliderHandler {
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            colliders: SlotMap::with_key(),
            tree: DynamicAabbTree::from_settings(&config.broadphase),
            config,
            pairs: Vec::new(),
            impulse_cache: HashMap::new(),
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Attaches a collider to `body`, inserts it into the broad phase and
    /// derives the body's inertia from the shape.
    pub fn add(
        &mut self,
        bodies: &mut RigidBodySet,
        body: BodyHandle,
        desc: ColliderDesc,
    ) -> Result<ColliderHandle, PhysicsError> {
        let rigid_body = bodies.get_mut(body).ok_or(PhysicsError::UnknownBody)?;
        let mut collider = Collider::new(body, desc)?;

        let aabb = collider.refresh(rigid_body);
        if rigid_body.is_dynamic() {
            let inverse = shape_inverse_inertia(collider.shape(), rigid_body);
            rigid_body.set_local_inverse_inertia(inverse);
        }

        let handle = self.colliders.insert(collider);
        self.tree.add(handle, aabb);
        log::debug!("Added collider {handle:?} to body {body:?}");
        Ok(handle)
    }

    pub fn remove(&mut self, handle: ColliderHandle) -> Option<Collider> {
        let collider = self.colliders.remove(handle)?;
        self.tree.remove(handle);
        Some(collider)
    }

    /// Removes every collider attached to `body`, returning how many there were.
    pub fn remove_body_colliders(&mut self, body: BodyHandle) -> usize {
        let handles: Vec<ColliderHandle> = self
            .colliders
            .iter()
            .filter(|(_, collider)| collider.body() == body)
            .map(|(handle, _)| handle)
            .collect();

        for handle in &handles {
            self.remove(*handle);
        }
        handles.len()
    }

    pub fn get(&self, handle: ColliderHandle) -> Option<&Collider> {
        self.colliders.get(handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ColliderHandle, &Collider)> {
        self.colliders.iter()
    }

    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }

    pub fn tree(&self) -> &DynamicAabbTree {
        &self.tree
    }

    /// Detects and resolves every contact between the colliders for one step.
    /// Body positions and velocities are updated in place; each collider's
    /// contact list holds the partners it touched.
    pub fn resolve_collisions(&mut self, bodies: &mut RigidBodySet) -> CollisionStats {
        let mut stats = CollisionStats {
            colliders: self.colliders.len(),
            ..Default::default()
        };

        for collider in self.colliders.values_mut() {
            collider.reset_contacts();
        }
        for body in bodies.values_mut() {
            body.refresh_world_inertia();
        }

        let broad_timer = ScopeTimer::new("broad phase");
        self.refresh_moved(bodies);
        self.find_candidate_pairs(bodies);
        stats.candidate_pairs = self.pairs.len();
        stats.broad_phase = broad_timer.finish();

        let narrow_timer = ScopeTimer::new("narrow phase");
        let contacts: Vec<PairContact> = self
            .pairs
            .iter()
            .filter_map(|&(a, b)| self.collide_pair(a, b))
            .collect();
        stats.contacts = contacts.len();
        stats.narrow_phase = narrow_timer.finish();

        let resolution_timer = ScopeTimer::new("contact resolution");
        let mut keys = Vec::with_capacity(contacts.len());
        let mut constraints = Vec::with_capacity(contacts.len());
        for contact in &contacts {
            if let Some(collider) = self.colliders.get_mut(contact.a) {
                collider.record_contact(contact.b, contact.normal);
            }
            if let Some(collider) = self.colliders.get_mut(contact.b) {
                collider.record_contact(contact.a, -contact.normal);
            }

            match &contact.manifold {
                Ok(manifold) => {
                    if let Some(constraint) = self.constrain(bodies, contact.a, contact.b, manifold) {
                        keys.push((contact.a, contact.b));
                        constraints.push(constraint);
                    }
                }
                Err(err) => {
                    stats.manifold_failures += 1;
                    log::debug!(
                        "No contact points for {:?} / {:?}: {err}",
                        contact.a,
                        contact.b
                    );
                }
            }
        }
        self.solve(bodies, &keys, &mut constraints);
        stats.resolution = resolution_timer.finish();

        stats
    }

    fn refresh_moved(&mut self, bodies: &RigidBodySet) {
        for (handle, collider) in self.colliders.iter_mut() {
            let Some(body) = bodies.get(collider.body()) else {
                continue;
            };
            if collider.is_stale(body) {
                let aabb = collider.refresh(body);
                self.tree.update(handle, aabb);
            }
        }
    }

    fn find_candidate_pairs(&mut self, bodies: &RigidBodySet) {
        let mut pairs = std::mem::take(&mut self.pairs);
        pairs.clear();

        let slack = self.config.broadphase.query_slack;
        for (handle, collider) in &self.colliders {
            self.tree.query(&collider.world_aabb(), slack, |other| {
                if other != handle {
                    pairs.push((handle, other));
                }
            });
        }

        Self::deduplicate_pairs(&mut pairs);
        pairs.retain(|&(a, b)| self.is_candidate(a, b, bodies));
        self.pairs = pairs;
    }

    fn deduplicate_pairs(pairs: &mut Vec<(ColliderHandle, ColliderHandle)>) {
        for (a, b) in pairs.iter_mut() {
            if *a > *b {
                std::mem::swap(a, b);
            }
        }

        pairs.sort_unstable();
        pairs.dedup();
    }

    fn is_candidate(&self, a: ColliderHandle, b: ColliderHandle, bodies: &RigidBodySet) -> bool {
        let (Some(collider_a), Some(collider_b)) = (self.colliders.get(a), self.colliders.get(b))
        else {
            return false;
        };
        if collider_a.body() == collider_b.body() || collider_a.shares_group(collider_b) {
            return false;
        }

        match (bodies.get(collider_a.body()), bodies.get(collider_b.body())) {
            (Some(body_a), Some(body_b)) => !(body_a.is_static() && body_b.is_static()),
            _ => false,
        }
    }

    fn collide_pair(&self, a: ColliderHandle, b: ColliderHandle) -> Option<PairContact> {
        let collider_a = self.colliders.get(a)?;
        let collider_b = self.colliders.get(b)?;
        let hit = self.narrow_phase(collider_a, collider_b)?;

        let manifold = build_manifold(
            collider_a.world_points(),
            collider_b.world_points(),
            hit.normal,
            hit.depth,
            hit.feature,
            ManifoldParams::from(&self.config.narrowphase),
        );

        Some(PairContact {
            a,
            b,
            normal: hit.normal,
            manifold,
        })
    }

    fn narrow_phase(&self, a: &Collider, b: &Collider) -> Option<NarrowHit> {
        let narrow = &self.config.narrowphase;

        if a.shape().is_cuboid() && b.shape().is_cuboid() {
            let contact = collide_obb_obb(&a.world_obb()?, &b.world_obb()?, narrow.sat_parallel_epsilon)?;
            return Some(NarrowHit {
                normal: contact.normal,
                depth: contact.depth,
                feature: contact.axis.into(),
            });
        }

        let threshold = self.config.broadphase.large_mesh_threshold;
        if a.world_points().len() > threshold || b.world_points().len() > threshold {
            let (obb_a, obb_b) = (a.world_obb()?, b.world_obb()?);
            if !obb_obb_intersects(&obb_a, &obb_b, narrow.sat_parallel_epsilon) {
                return None;
            }
        }

        let result = penetration(
            a.world_points(),
            b.world_points(),
            GjkParams::from(narrow),
            EpaParams::from(narrow),
        )?;
        Some(NarrowHit {
            normal: result.normal,
            depth: result.depth,
            feature: ContactFeature::Unknown,
        })
    }

    fn constrain(
        &self,
        bodies: &RigidBodySet,
        a: ColliderHandle,
        b: ColliderHandle,
        manifold: &ContactManifold,
    ) -> Option<ManifoldConstraint> {
        let collider_a = self.colliders.get(a)?;
        let collider_b = self.colliders.get(b)?;
        let solver = &self.config.solver;
        let material = CombinedMaterial::combine(collider_a.material(), collider_b.material(), solver);
        let mut constraint =
            ManifoldConstraint::new(bodies, collider_a.body(), collider_b.body(), manifold, material, solver)?;

        if let Some(previous) = self.impulse_cache.get(&(a, b)) {
            constraint.seed(previous, solver.warm_start_factor);
        }
        Some(constraint)
    }

    /// Solves every constraint of the step together, then records impact
    /// speeds and hard collisions on the colliders involved.
    fn solve(
        &mut self,
        bodies: &mut RigidBodySet,
        keys: &[(ColliderHandle, ColliderHandle)],
        constraints: &mut [ManifoldConstraint],
    ) {
        let mut before: SecondaryMap<BodyHandle, Vec3> = SecondaryMap::new();
        for constraint in constraints.iter() {
            for handle in [constraint.body_a, constraint.body_b] {
                if let Some(body) = bodies.get(handle) {
                    before.insert(handle, body.linear_velocity);
                }
            }
        }

        let solver = &self.config.solver;
        warm_start(bodies, constraints);
        solve_velocities(bodies, constraints, solver);
        correct_positions(bodies, constraints, solver);

        for (&(a, b), constraint) in keys.iter().zip(constraints.iter()) {
            let speed = constraint.approach_speed();
            for handle in [a, b] {
                if let Some(collider) = self.colliders.get_mut(handle) {
                    collider.record_impact(speed);
                }
            }
        }

        let threshold = self.config.solver.hard_collision_threshold;
        for (handle, collider) in self.colliders.iter_mut() {
            let Some(previous) = before.get(collider.body()) else {
                continue;
            };
            let Some(body) = bodies.get(collider.body()) else {
                continue;
            };
            if (body.linear_velocity - *previous).length() > threshold {
                collider.mark_hard_collided();
                log::debug!("Hard collision on {handle:?}");
            }
        }

        self.impulse_cache = keys
            .iter()
            .zip(constraints.iter())
            .map(|(key, constraint)| (*key, constraint.cached_impulses()))
            .collect();
    }
}

/// Inverse inertia of `shape` scaled by the body, from its triangle mesh when
/// it has one and from its bounding box otherwise.
fn shape_inverse_inertia(shape: &ColliderShape, body: &RigidBody) -> Mat3 {
    let scale = body.scale;
    let inertia = shape
        .triangle_mesh()
        .and_then(|(points, triangles)| {
            let scaled: Vec<Vec3> = points.iter().map(|p| *p * scale).collect();
            mesh_mass_properties(&scaled, &triangles, body.mass())
        })
        .map(|properties| properties.inertia)
        .unwrap_or_else(|| {
            let local = shape.local_aabb();
            box_inertia(body.mass(), (local.max - local.min) * scale.abs())
        });
    invert_inertia(&inertia)
}
