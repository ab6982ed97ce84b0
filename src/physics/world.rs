//! Well World
//!
//! Deterministic fixed-point rigid-body world: balls falling into a
//! rectangular well. Built for the board's needs, not as a general engine:
//! every dynamic body carries exactly one ball collider, and the only
//! static colliders are the floor and the two walls.

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};

use crate::config::WellConfig;
use crate::core::fixed::{
    Fixed, FIXED_ONE, TICK_DURATION, MAX_SPEED, RESTITUTION, CONTACT_FRICTION,
    fixed_mul, fixed_div, to_float, wrap_angle,
};
use crate::core::vec2::FixedVec2;
use super::arena::Arena;
use super::contact::{circle_circle, box_circle, CONTACT_MARGIN};
use super::{
    BodyHandle, ColliderHandle, CollisionEvent, DebugLine, PhysicsBackend, PhysicsError,
};

/// Position/velocity solver passes per step.
const SOLVER_ITERATIONS: usize = 4;

/// Unit octagon used to outline balls in the debug overlay.
const OCTAGON: [(f32, f32); 8] = [
    (1.0, 0.0),
    (0.70710677, 0.70710677),
    (0.0, 1.0),
    (-0.70710677, 0.70710677),
    (-1.0, 0.0),
    (-0.70710677, -0.70710677),
    (0.0, -1.0),
    (0.70710677, -0.70710677),
];

#[derive(Clone, Debug, Serialize, Deserialize)]
enum Shape {
    Ball { radius: Fixed },
    Cuboid { half_extents: FixedVec2 },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct RigidBody {
    position: FixedVec2,
    velocity: FixedVec2,
    rotation: Fixed,
    collider: Option<ColliderHandle>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Collider {
    shape: Shape,
    parent: Option<BodyHandle>,
    /// World position of static colliders; attached colliders follow their body.
    translation: FixedVec2,
}

/// Dynamic ball taking part in a step.
#[derive(Clone, Copy)]
struct StepBall {
    body: BodyHandle,
    collider: ColliderHandle,
    radius: Fixed,
}

/// Static box taking part in a step.
#[derive(Clone, Copy)]
struct StepBox {
    collider: ColliderHandle,
    center: FixedVec2,
    half_extents: FixedVec2,
}

/// The built-in physics world.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WellWorld {
    config: WellConfig,
    bodies: Arena<RigidBody>,
    colliders: Arena<Collider>,
    /// Pairs in contact after the last step, smaller handle first.
    contacts: BTreeSet<(ColliderHandle, ColliderHandle)>,
    #[serde(skip)]
    events: Vec<CollisionEvent>,
    steps: u64,
}

impl WellWorld {
    /// Build an empty well: floor, left wall, right wall.
    pub fn new(config: &WellConfig) -> Self {
        let mut world = Self {
            config: config.clone(),
            bodies: Arena::new(),
            colliders: Arena::new(),
            contacts: BTreeSet::new(),
            events: Vec::new(),
            steps: 0,
        };

        let t = config.wall_thickness;
        let half_t = t / 2;
        let origin = config.origin;

        // Floor
        world.add_static_box(
            FixedVec2::new(origin.x + config.width / 2, origin.y + config.height + half_t),
            FixedVec2::new(config.width / 2, half_t),
        );
        // Left wall
        world.add_static_box(
            FixedVec2::new(origin.x + half_t, origin.y + config.height / 2),
            FixedVec2::new(half_t, config.height / 2),
        );
        // Right wall
        world.add_static_box(
            FixedVec2::new(origin.x + config.width - half_t, origin.y + config.height / 2),
            FixedVec2::new(half_t, config.height / 2),
        );

        world
    }

    fn add_static_box(&mut self, center: FixedVec2, half_extents: FixedVec2) -> ColliderHandle {
        ColliderHandle(self.colliders.insert(Collider {
            shape: Shape::Cuboid { half_extents },
            parent: None,
            translation: center,
        }))
    }

    /// Geometry this world was built with.
    pub fn config(&self) -> &WellConfig {
        &self.config
    }

    /// Number of colliders without a parent body.
    pub fn static_collider_count(&self) -> usize {
        self.colliders.iter().filter(|(_, c)| c.parent.is_none()).count()
    }

    /// Static collider handles in creation order (floor, left wall, right wall).
    pub fn static_colliders(&self) -> Vec<ColliderHandle> {
        self.colliders
            .iter()
            .filter(|(_, c)| c.parent.is_none())
            .map(|(index, _)| ColliderHandle(index))
            .collect()
    }

    /// Number of live dynamic bodies.
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Steps taken since construction.
    pub fn step_count(&self) -> u64 {
        self.steps
    }

    /// Current velocity of a body.
    pub fn body_velocity(&self, body: BodyHandle) -> Result<FixedVec2, PhysicsError> {
        self.bodies
            .get(body.0)
            .map(|b| b.velocity)
            .ok_or(PhysicsError::UnknownBody(body))
    }

    fn collect_balls(&self) -> Vec<StepBall> {
        self.colliders
            .iter()
            .filter_map(|(index, collider)| match (collider.parent, &collider.shape) {
                (Some(body), Shape::Ball { radius }) => Some(StepBall {
                    body,
                    collider: ColliderHandle(index),
                    radius: *radius,
                }),
                _ => None,
            })
            .collect()
    }

    fn collect_boxes(&self) -> Vec<StepBox> {
        self.colliders
            .iter()
            .filter_map(|(index, collider)| match (collider.parent, &collider.shape) {
                (None, Shape::Cuboid { half_extents }) => Some(StepBox {
                    collider: ColliderHandle(index),
                    center: collider.translation,
                    half_extents: *half_extents,
                }),
                _ => None,
            })
            .collect()
    }

    fn kinematics(&self, body: BodyHandle) -> (FixedVec2, FixedVec2) {
        self.bodies
            .get(body.0)
            .map(|b| (b.position, b.velocity))
            .unwrap_or((FixedVec2::ZERO, FixedVec2::ZERO))
    }

    fn set_kinematics(&mut self, body: BodyHandle, position: FixedVec2, velocity: FixedVec2) {
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.position = position;
            b.velocity = velocity;
        }
    }

    fn integrate(&mut self) {
        let gravity_dv = fixed_mul(self.config.gravity, TICK_DURATION);
        let max_speed_sq = (MAX_SPEED as i64) * (MAX_SPEED as i64);

        for (_, body) in self.bodies.iter_mut() {
            body.velocity.y += gravity_dv;
            if body.velocity.length_squared_wide() > max_speed_sq {
                body.velocity = body.velocity.normalize().scale(MAX_SPEED);
            }
            body.position = body.position + body.velocity.scale(TICK_DURATION);
        }
    }

    fn solve_ball_pair(&mut self, a: StepBall, b: StepBall) {
        let (pa, va) = self.kinematics(a.body);
        let (pb, vb) = self.kinematics(b.body);

        let contact = match circle_circle(pa, a.radius, pb, b.radius, 0) {
            Some(c) if c.depth > 0 => c,
            _ => return,
        };

        let correction = contact.normal.scale(contact.depth / 2);
        let (pa, pb) = (pa - correction, pb + correction);

        // Equal masses: split the restitution impulse evenly
        let approach = (vb - va).dot(contact.normal);
        let (va, vb) = if approach < 0 {
            let impulse = contact.normal.scale(fixed_mul(FIXED_ONE + RESTITUTION, -approach) / 2);
            (va - impulse, vb + impulse)
        } else {
            (va, vb)
        };

        self.set_kinematics(a.body, pa, va);
        self.set_kinematics(b.body, pb, vb);
    }

    fn solve_ball_box(&mut self, ball: StepBall, wall: StepBox) {
        let (position, velocity) = self.kinematics(ball.body);

        let contact = match box_circle(wall.center, wall.half_extents, position, ball.radius, 0) {
            Some(c) if c.depth > 0 => c,
            _ => return,
        };

        let position = position + contact.normal.scale(contact.depth);
        let normal_speed = velocity.dot(contact.normal);
        let velocity = if normal_speed < 0 {
            let normal_part = contact.normal.scale(normal_speed);
            let tangent = (velocity - normal_part).scale(CONTACT_FRICTION);
            tangent - normal_part.scale(RESTITUTION)
        } else {
            velocity
        };

        self.set_kinematics(ball.body, position, velocity);
    }

    fn roll(&mut self, balls: &[StepBall]) {
        for ball in balls {
            if let Some(body) = self.bodies.get_mut(ball.body.0) {
                let spin = fixed_mul(fixed_div(body.velocity.x, ball.radius), TICK_DURATION);
                body.rotation = wrap_angle(body.rotation + spin);
            }
        }
    }

    fn detect_contacts(&self, balls: &[StepBall], boxes: &[StepBox]) -> BTreeSet<(ColliderHandle, ColliderHandle)> {
        let mut pairs = BTreeSet::new();

        for (i, a) in balls.iter().enumerate() {
            let (pa, _) = self.kinematics(a.body);

            for b in &balls[i + 1..] {
                let (pb, _) = self.kinematics(b.body);
                if circle_circle(pa, a.radius, pb, b.radius, CONTACT_MARGIN).is_some() {
                    pairs.insert(ordered(a.collider, b.collider));
                }
            }

            for wall in boxes {
                if box_circle(wall.center, wall.half_extents, pa, a.radius, CONTACT_MARGIN).is_some() {
                    pairs.insert(ordered(wall.collider, a.collider));
                }
            }
        }

        pairs
    }
}

fn ordered(a: ColliderHandle, b: ColliderHandle) -> (ColliderHandle, ColliderHandle) {
    if a <= b { (a, b) } else { (b, a) }
}

impl PhysicsBackend for WellWorld {
    fn create_ball(&mut self, position: FixedVec2, radius: Fixed) -> (BodyHandle, ColliderHandle) {
        let body = BodyHandle(self.bodies.insert(RigidBody {
            position,
            velocity: FixedVec2::ZERO,
            rotation: 0,
            collider: None,
        }));
        let collider = ColliderHandle(self.colliders.insert(Collider {
            shape: Shape::Ball { radius },
            parent: Some(body),
            translation: FixedVec2::ZERO,
        }));
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.collider = Some(collider);
        }
        (body, collider)
    }

    fn remove_body(&mut self, body: BodyHandle) -> Result<(), PhysicsError> {
        let removed = self.bodies.remove(body.0).ok_or(PhysicsError::UnknownBody(body))?;
        if let Some(collider) = removed.collider {
            self.colliders.remove(collider.0);
            self.contacts.retain(|(a, b)| *a != collider && *b != collider);
        }
        Ok(())
    }

    fn body_translation(&self, body: BodyHandle) -> Result<FixedVec2, PhysicsError> {
        self.bodies
            .get(body.0)
            .map(|b| b.position)
            .ok_or(PhysicsError::UnknownBody(body))
    }

    fn body_rotation(&self, body: BodyHandle) -> Result<Fixed, PhysicsError> {
        self.bodies
            .get(body.0)
            .map(|b| b.rotation)
            .ok_or(PhysicsError::UnknownBody(body))
    }

    fn collider_parent(&self, collider: ColliderHandle) -> Option<BodyHandle> {
        self.colliders.get(collider.0).and_then(|c| c.parent)
    }

    fn live_dynamic_colliders(&self) -> BTreeSet<ColliderHandle> {
        self.colliders
            .iter()
            .filter(|(_, c)| c.parent.is_some())
            .map(|(index, _)| ColliderHandle(index))
            .collect()
    }

    fn horizontal_bounds(&self) -> (Fixed, Fixed) {
        self.config.interior_x()
    }

    fn step(&mut self) {
        let balls = self.collect_balls();
        let boxes = self.collect_boxes();

        self.integrate();

        for _ in 0..SOLVER_ITERATIONS {
            for (i, &a) in balls.iter().enumerate() {
                for &b in &balls[i + 1..] {
                    self.solve_ball_pair(a, b);
                }
            }
            for &ball in &balls {
                for &wall in &boxes {
                    self.solve_ball_box(ball, wall);
                }
            }
        }

        self.roll(&balls);

        let current = self.detect_contacts(&balls, &boxes);
        for &(a, b) in current.difference(&self.contacts) {
            self.events.push(CollisionEvent { collider_a: a, collider_b: b, started: true });
        }
        for &(a, b) in self.contacts.difference(&current) {
            self.events.push(CollisionEvent { collider_a: a, collider_b: b, started: false });
        }
        self.contacts = current;
        self.steps += 1;
    }

    fn drain_collision_events(&mut self) -> std::vec::Drain<'_, CollisionEvent> {
        self.events.drain(..)
    }

    fn debug_lines(&self) -> Vec<DebugLine> {
        let mut lines = Vec::new();

        for (_, collider) in self.colliders.iter() {
            match (&collider.shape, collider.parent) {
                (Shape::Cuboid { half_extents }, _) => {
                    let c = collider.translation;
                    let h = *half_extents;
                    let corners = [
                        FixedVec2::new(c.x - h.x, c.y - h.y).to_floats(),
                        FixedVec2::new(c.x + h.x, c.y - h.y).to_floats(),
                        FixedVec2::new(c.x + h.x, c.y + h.y).to_floats(),
                        FixedVec2::new(c.x - h.x, c.y + h.y).to_floats(),
                    ];
                    for i in 0..4 {
                        lines.push(DebugLine { start: corners[i], end: corners[(i + 1) % 4] });
                    }
                }
                (Shape::Ball { radius }, Some(body)) => {
                    let Some(b) = self.bodies.get(body.0) else { continue };
                    let (cx, cy) = b.position.to_floats();
                    let r = to_float(*radius);
                    let point = |(ux, uy): (f32, f32)| (cx + ux * r, cy + uy * r);

                    for i in 0..OCTAGON.len() {
                        lines.push(DebugLine {
                            start: point(OCTAGON[i]),
                            end: point(OCTAGON[(i + 1) % OCTAGON.len()]),
                        });
                    }

                    let angle = to_float(b.rotation);
                    lines.push(DebugLine {
                        start: (cx, cy),
                        end: point((angle.cos(), angle.sin())),
                    });
                }
                (Shape::Ball { .. }, None) => {}
            }
        }

        lines
    }

    fn take_snapshot(&self) -> Result<Vec<u8>, PhysicsError> {
        Ok(bincode::serialize(self)?)
    }

    fn from_snapshot(bytes: &[u8]) -> Result<Self, PhysicsError> {
        let world: WellWorld = bincode::deserialize(bytes)?;

        // Every attached collider must point at a live body that points back
        for (index, collider) in world.colliders.iter() {
            let handle = ColliderHandle(index);
            if let Some(parent) = collider.parent {
                let body = world.bodies.get(parent.0).ok_or(PhysicsError::UnknownBody(parent))?;
                if body.collider != Some(handle) {
                    return Err(PhysicsError::UnknownCollider(handle));
                }
            } else if matches!(collider.shape, Shape::Ball { .. }) {
                return Err(PhysicsError::UnknownCollider(handle));
            }
        }

        // And every body must own exactly the collider that names it
        for (index, body) in world.bodies.iter() {
            let owner = BodyHandle(index);
            let collider = body.collider.ok_or(PhysicsError::UnknownBody(owner))?;
            match world.colliders.get(collider.0) {
                Some(c) if c.parent == Some(owner) => {}
                _ => return Err(PhysicsError::UnknownCollider(collider)),
            }
        }

        Ok(world)
    }
}
