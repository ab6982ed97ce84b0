//! Piece Catalog
//!
//! Static table of the eleven fruit tiers. A piece's physical radius is
//! derived from its sprite width (sprites are drawn at 1/5 scale, so the
//! radius is `width / 10`), and its anchor is the point of the sprite that
//! sits on the physics body's centre.

use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, FIXED_ONE};

/// Catalog errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// Tier index past the last fruit.
    #[error("Tier {tier} out of range (catalog has {count} tiers)")]
    OutOfRange {
        /// Requested tier.
        tier: u8,
        /// Number of tiers.
        count: u8,
    },
}

/// Fruit tier, smallest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
#[derive(Default)]
pub enum Fruit {
    /// Tier 0
    #[default]
    Cherry = 0,
    /// Tier 1
    Strawberry = 1,
    /// Tier 2
    Grape = 2,
    /// Tier 3
    Orange = 3,
    /// Tier 4
    Persimmon = 4,
    /// Tier 5
    Apple = 5,
    /// Tier 6
    Yuzu = 6,
    /// Tier 7
    Peach = 7,
    /// Tier 8
    Pineapple = 8,
    /// Tier 9
    Honeydew = 9,
    /// Tier 10, merge-terminal
    Watermelon = 10,
}

/// Sprite metrics for one tier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FruitInfo {
    /// Display name.
    pub name: &'static str,
    /// Sprite width in texture pixels.
    pub width: u32,
    /// Sprite height in texture pixels.
    pub height: u32,
    /// Anchor as a fraction of the sprite's bounding box.
    pub anchor: (f32, f32),
}

const CATALOG: [FruitInfo; 11] = [
    FruitInfo { name: "cherry", width: 118, height: 136, anchor: (0.5, 88.0 / 136.0) },
    FruitInfo { name: "strawberry", width: 140, height: 148, anchor: (0.5, 75.0 / 148.0) },
    FruitInfo { name: "grape", width: 184, height: 184, anchor: (0.5, 0.5) },
    FruitInfo { name: "orange", width: 218, height: 226, anchor: (0.5, 122.0 / 226.0) },
    FruitInfo { name: "persimmon", width: 272, height: 283, anchor: (0.5, 151.5 / 283.0) },
    FruitInfo { name: "apple", width: 341, height: 351, anchor: (170.0 / 341.0, 187.0 / 351.0) },
    FruitInfo { name: "yuzu", width: 400, height: 416, anchor: (0.5, 219.0 / 416.0) },
    FruitInfo { name: "peach", width: 470, height: 470, anchor: (0.5, 0.5) },
    FruitInfo { name: "pineapple", width: 520, height: 616, anchor: (0.5, 348.0 / 616.0) },
    FruitInfo { name: "honeydew", width: 600, height: 600, anchor: (0.5, 0.5) },
    FruitInfo { name: "watermelon", width: 700, height: 700, anchor: (0.5, 0.5) },
];

impl Fruit {
    /// Every tier, smallest first.
    pub const ALL: [Fruit; 11] = [
        Fruit::Cherry,
        Fruit::Strawberry,
        Fruit::Grape,
        Fruit::Orange,
        Fruit::Persimmon,
        Fruit::Apple,
        Fruit::Yuzu,
        Fruit::Peach,
        Fruit::Pineapple,
        Fruit::Honeydew,
        Fruit::Watermelon,
    ];

    /// Tier index.
    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Get fruit from tier index (0-10).
    pub fn from_index(index: u8) -> Option<Fruit> {
        Self::ALL.get(index as usize).copied()
    }

    /// Next tier (if not terminal).
    pub fn next(self) -> Option<Fruit> {
        Self::from_index(self.index() + 1)
    }

    /// Sprite metrics.
    #[inline]
    pub fn info(self) -> &'static FruitInfo {
        &CATALOG[self as usize]
    }

    /// Collision radius.
    #[inline]
    pub fn radius(self) -> Fixed {
        (self.info().width as i32 * FIXED_ONE) / 10
    }

    /// Points awarded for creating this fruit by a merge: `(t+1)(t+2)/2`.
    #[inline]
    pub fn points(self) -> u64 {
        let t = self.index() as u64;
        (t + 1) * (t + 2) / 2
    }
}

/// Number of tiers.
pub fn tier_count() -> u8 {
    CATALOG.len() as u8
}

/// Radius of a tier.
pub fn radius(tier: u8) -> Result<Fixed, CatalogError> {
    entry(tier).map(|fruit| fruit.radius())
}

/// Successor of a tier; `None` for the terminal tier and out-of-range input.
pub fn next_tier(tier: u8) -> Option<u8> {
    Fruit::from_index(tier).and_then(Fruit::next).map(Fruit::index)
}

/// Look up a tier.
pub fn entry(tier: u8) -> Result<Fruit, CatalogError> {
    Fruit::from_index(tier).ok_or(CatalogError::OutOfRange {
        tier,
        count: tier_count(),
    })
}
