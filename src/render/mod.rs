//! Renderer Collaborator
//!
//! One visual proxy per live piece, plus a debug overlay redrawn every
//! tick. [`HeadlessRenderer`] records what a scene graph would show; the
//! server, the bot and the tests use it.

use std::collections::BTreeMap;

use crate::core::fixed::{Fixed, to_float};
use crate::core::vec2::FixedVec2;
use crate::game::catalog::Fruit;
use crate::physics::DebugLine;

/// Identifier of a visual proxy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProxyId(pub u64);

/// Scene renderer as seen by the board.
pub trait Renderer {
    /// Create a sprite for `fruit` at `position`.
    fn create_proxy(&mut self, fruit: Fruit, position: FixedVec2) -> ProxyId;

    /// Destroy a sprite. Returns `false` if it did not exist.
    fn destroy_proxy(&mut self, proxy: ProxyId) -> bool;

    /// Push a body's pose into its sprite.
    fn set_transform(&mut self, proxy: ProxyId, position: FixedVec2, rotation: Fixed);

    /// Replace the debug overlay.
    fn draw_debug(&mut self, lines: &[DebugLine]);
}

/// A recorded sprite.
#[derive(Clone, Debug, PartialEq)]
pub struct Sprite {
    /// Fruit drawn.
    pub fruit: Fruit,
    /// Anchor fraction, from the catalog.
    pub anchor: (f32, f32),
    /// Position in render units.
    pub position: (f32, f32),
    /// Rotation in radians.
    pub rotation: f32,
}

/// Renderer that keeps sprites in memory.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    next_id: u64,
    sprites: BTreeMap<ProxyId, Sprite>,
    debug: Vec<DebugLine>,
    debug_frames: u64,
}

impl HeadlessRenderer {
    /// Create an empty renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a sprite.
    pub fn sprite(&self, proxy: ProxyId) -> Option<&Sprite> {
        self.sprites.get(&proxy)
    }

    /// Number of live sprites.
    pub fn sprite_count(&self) -> usize {
        self.sprites.len()
    }

    /// All live sprites.
    pub fn sprites(&self) -> impl Iterator<Item = (&ProxyId, &Sprite)> {
        self.sprites.iter()
    }

    /// Overlay from the last `draw_debug` call.
    pub fn debug_lines(&self) -> &[DebugLine] {
        &self.debug
    }

    /// Number of overlay redraws.
    pub fn debug_frames(&self) -> u64 {
        self.debug_frames
    }
}

impl Renderer for HeadlessRenderer {
    fn create_proxy(&mut self, fruit: Fruit, position: FixedVec2) -> ProxyId {
        let id = ProxyId(self.next_id);
        self.next_id += 1;
        self.sprites.insert(id, Sprite {
            fruit,
            anchor: fruit.info().anchor,
            position: position.to_floats(),
            rotation: 0.0,
        });
        id
    }

    fn destroy_proxy(&mut self, proxy: ProxyId) -> bool {
        self.sprites.remove(&proxy).is_some()
    }

    fn set_transform(&mut self, proxy: ProxyId, position: FixedVec2, rotation: Fixed) {
        if let Some(sprite) = self.sprites.get_mut(&proxy) {
            sprite.position = position.to_floats();
            sprite.rotation = to_float(rotation);
        }
    }

    fn draw_debug(&mut self, lines: &[DebugLine]) {
        self.debug.clear();
        self.debug.extend_from_slice(lines);
        self.debug_frames += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::FIXED_HALF;

    #[test]
    fn test_proxy_lifecycle() {
        let mut renderer = HeadlessRenderer::new();
        let a = renderer.create_proxy(Fruit::Cherry, FixedVec2::from_ints(10, 20));
        let b = renderer.create_proxy(Fruit::Apple, FixedVec2::from_ints(30, 40));

        assert_ne!(a, b);
        assert_eq!(renderer.sprite_count(), 2);
        assert_eq!(renderer.sprite(b).unwrap().anchor, Fruit::Apple.info().anchor);

        assert!(renderer.destroy_proxy(a));
        assert!(!renderer.destroy_proxy(a));
        assert_eq!(renderer.sprite_count(), 1);
    }

    #[test]
    fn test_set_transform() {
        let mut renderer = HeadlessRenderer::new();
        let id = renderer.create_proxy(Fruit::Grape, FixedVec2::ZERO);
        renderer.set_transform(id, FixedVec2::from_ints(5, 6), FIXED_HALF);

        let sprite = renderer.sprite(id).unwrap();
        assert_eq!(sprite.position, (5.0, 6.0));
        assert_eq!(sprite.rotation, 0.5);
    }

    #[test]
    fn test_draw_debug_replaces_overlay() {
        let mut renderer = HeadlessRenderer::new();
        let line = DebugLine { start: (0.0, 0.0), end: (1.0, 1.0) };

        renderer.draw_debug(&[line, line]);
        renderer.draw_debug(&[line]);
        assert_eq!(renderer.debug_lines().len(), 1);
        assert_eq!(renderer.debug_frames(), 2);
    }
}
