//! Q16.16 Fixed-Point Arithmetic
//!
//! Deterministic fixed-point math for the board simulation.
//! Physics stepping, merge midpoints and drop positions all use integer
//! arithmetic so two clients replaying the same board agree bit for bit.
//!
//! ## Format: Q16.16
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Bit Layout: Q16.16 (32-bit signed integer)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  [S][IIIIIIIIIIIIIIII][FFFFFFFFFFFFFFFF]                    │
//! │   │  └──── 16 bits ────┘└──── 16 bits ────┘                 │
//! │   └─ Sign bit                                               │
//! │                                                             │
//! │  Range: -32768.0 to +32767.99998 (approx)                   │
//! │  Precision: 1/65536 ≈ 0.000015 units                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The well lives in screen space (roughly 0..500 units on both axes), so
//! positions and velocities stay far from the range limits. Squared
//! distances do NOT fit and are computed with `i64` intermediates.

/// Q16.16 fixed-point number stored as i32.
pub type Fixed = i32;

/// Number of fractional bits (16)
pub const FIXED_SCALE: i32 = 16;

/// 1.0 in fixed-point (65536)
pub const FIXED_ONE: Fixed = 1 << FIXED_SCALE;

/// 0.5 in fixed-point (32768)
pub const FIXED_HALF: Fixed = FIXED_ONE >> 1;

// =============================================================================
// SIMULATION CONSTANTS (integer literals - no float conversion)
// =============================================================================

/// Tick duration: 1/60 second = round(65536/60) = 1092
pub const TICK_DURATION: Fixed = 1092;

/// Downward gravity: 196.2 units/s² = round(196.2 * 65536) = 12858163
pub const GRAVITY: Fixed = 12858163;

/// Speed cap for falling pieces: 900 units/s
pub const MAX_SPEED: Fixed = 900 * FIXED_ONE;

/// Restitution on contact: 0.2 = round(0.2 * 65536)
pub const RESTITUTION: Fixed = 13107;

/// Tangential damping applied on wall/floor contact: 0.9
pub const CONTACT_FRICTION: Fixed = 58982;

/// pi in fixed-point (3.14159 * 65536)
pub const FIXED_PI: Fixed = 205887;

// =============================================================================
// CORE OPERATIONS
// =============================================================================

/// Convert a float to fixed-point.
///
/// Only used at configuration time and in tests, never inside a step.
///
/// # Example
/// ```
/// use suika_arena::core::fixed::{to_fixed, FIXED_ONE};
/// assert_eq!(to_fixed(2.5), FIXED_ONE * 2 + FIXED_ONE / 2);
/// ```
#[inline]
pub fn to_fixed(f: f64) -> Fixed {
    (f * (FIXED_ONE as f64)) as Fixed
}

/// Convert fixed-point to float for rendering and logs.
#[inline]
pub fn to_float(f: Fixed) -> f32 {
    f as f32 / FIXED_ONE as f32
}

/// Fixed-point from a whole number of units.
#[inline]
pub const fn from_int(i: i32) -> Fixed {
    i << FIXED_SCALE
}

/// Multiply two fixed-point numbers (i64 intermediate, truncating).
#[inline]
pub fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    let wide = (a as i64) * (b as i64);
    (wide >> FIXED_SCALE) as Fixed
}

/// Divide two fixed-point numbers. Divide-by-zero returns 0.
#[inline]
pub fn fixed_div(a: Fixed, b: Fixed) -> Fixed {
    if b == 0 {
        return 0;
    }
    let wide = (a as i64) << FIXED_SCALE;
    (wide / b as i64) as Fixed
}

/// Integer square root of a u64 (floor), bit-by-bit.
///
/// Used to turn a Q32.32 squared length into a Q16.16 length.
pub fn isqrt_u64(value: u64) -> u64 {
    if value < 2 {
        return value;
    }

    let mut op = value;
    let mut res = 0u64;
    let mut one = 1u64 << 62;

    while one > op {
        one >>= 2;
    }

    while one != 0 {
        if op >= res + one {
            op -= res + one;
            res = (res >> 1) + one;
        } else {
            res >>= 1;
        }
        one >>= 2;
    }

    res
}

/// Square root of a Q32.32 value (as produced by multiplying two
/// Q16.16 numbers without shifting), returned as Q16.16.
#[inline]
pub fn sqrt_wide(value: i64) -> Fixed {
    if value <= 0 {
        return 0;
    }
    isqrt_u64(value as u64) as Fixed
}

/// Absolute value of a fixed-point number.
#[inline]
pub fn fixed_abs(x: Fixed) -> Fixed {
    if x < 0 { x.wrapping_neg() } else { x }
}

/// Clamp a fixed-point number to a range.
#[inline]
pub fn fixed_clamp(value: Fixed, min: Fixed, max: Fixed) -> Fixed {
    value.max(min).min(max)
}

/// Wrap an angle into (-pi, pi].
#[inline]
pub fn wrap_angle(angle: Fixed) -> Fixed {
    let two_pi = FIXED_PI * 2;
    let mut a = angle % two_pi;
    if a > FIXED_PI {
        a -= two_pi;
    } else if a <= -FIXED_PI {
        a += two_pi;
    }
    a
}
