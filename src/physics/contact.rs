//! Contact Detection
//!
//! Narrow-phase tests between balls and between a ball and an
//! axis-aligned box. Squared distances are computed in Q32.32 since board
//! distances overflow Q16.16 once squared.

use crate::core::fixed::{Fixed, FIXED_ONE, FIXED_HALF, fixed_abs, fixed_clamp, sqrt_wide};
use crate::core::vec2::FixedVec2;

/// Gap (0.5 units) under which two shapes still count as touching.
///
/// Resting pieces drift in and out of exact contact every step; the
/// margin keeps their contact pair stable.
pub const CONTACT_MARGIN: Fixed = FIXED_HALF;

/// Contact between two shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Contact {
    /// Unit normal pointing from the first shape toward the second.
    pub normal: FixedVec2,
    /// Penetration depth. Negative when the shapes are within the margin
    /// but not overlapping.
    pub depth: Fixed,
}

/// Check if two circles overlap.
#[inline]
pub fn circles_overlap(
    pos_a: FixedVec2,
    radius_a: Fixed,
    pos_b: FixedVec2,
    radius_b: Fixed,
) -> bool {
    let combined = (radius_a + radius_b) as i64;
    pos_a.distance_squared_wide(pos_b) < combined * combined
}

/// Ball/ball contact, reported while the gap is below `margin`.
pub fn circle_circle(
    pos_a: FixedVec2,
    radius_a: Fixed,
    pos_b: FixedVec2,
    radius_b: Fixed,
    margin: Fixed,
) -> Option<Contact> {
    let reach = (radius_a + radius_b + margin) as i64;
    let delta = pos_b - pos_a;
    let dist_sq = delta.length_squared_wide();
    if dist_sq >= reach * reach {
        return None;
    }

    let dist = sqrt_wide(dist_sq);
    let normal = if dist == 0 {
        // Coincident centres: separate along +X
        FixedVec2::new(FIXED_ONE, 0)
    } else {
        delta.div_scalar(dist)
    };

    Some(Contact {
        normal,
        depth: radius_a + radius_b - dist,
    })
}

/// Box/ball contact. The normal points out of the box toward the ball.
pub fn box_circle(
    box_center: FixedVec2,
    half_extents: FixedVec2,
    center: FixedVec2,
    radius: Fixed,
    margin: Fixed,
) -> Option<Contact> {
    let local = center - box_center;
    let clamped = FixedVec2::new(
        fixed_clamp(local.x, -half_extents.x, half_extents.x),
        fixed_clamp(local.y, -half_extents.y, half_extents.y),
    );

    if clamped == local {
        // Centre inside the box: push out through the nearest face
        let dx = half_extents.x - fixed_abs(local.x);
        let dy = half_extents.y - fixed_abs(local.y);
        let contact = if dx < dy {
            let sign = if local.x < 0 { -FIXED_ONE } else { FIXED_ONE };
            Contact { normal: FixedVec2::new(sign, 0), depth: dx + radius }
        } else {
            let sign = if local.y <= 0 { -FIXED_ONE } else { FIXED_ONE };
            Contact { normal: FixedVec2::new(0, sign), depth: dy + radius }
        };
        return Some(contact);
    }

    let offset = local - clamped;
    let reach = (radius + margin) as i64;
    let dist_sq = offset.length_squared_wide();
    if dist_sq >= reach * reach {
        return None;
    }

    let dist = sqrt_wide(dist_sq);
    Some(Contact {
        normal: offset.div_scalar(dist),
        depth: radius - dist,
    })
}
