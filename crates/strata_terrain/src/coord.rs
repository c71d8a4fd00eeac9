//! # Chunk Coordinates
//!
//! Unsigned 2D coordinates on the chunk grid, plus the world-space mapping.
//!
//! The grid is addressed by `(x, z)` pairs; world positions are floating
//! point and map onto the grid by dividing through the fixed chunk
//! world-space size. Subtraction is a *span* (componentwise absolute
//! difference) so coordinate arithmetic never leaves the unsigned domain.

use std::ops::{Add, Div, Mul, Sub};

use bytemuck::{Pod, Zeroable};

/// World-space edge length of one chunk.
pub const CHUNK_WORLD_SIZE: f32 = 4.0;

/// 2D world position - streaming handle positions, sample points.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vec2 {
    /// X component.
    pub x: f32,
    /// Y component (maps onto the grid's z axis).
    pub y: f32,
}

impl Vec2 {
    /// Zero vector.
    pub const ZERO: Self = Self::new(0.0, 0.0);

    /// Creates a new Vec2.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Coordinate of a chunk in the terrain grid.
///
/// Unsigned on both axes. `x` runs along the file's row-major direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChunkCoord {
    /// X coordinate (in chunks).
    pub x: u32,
    /// Z coordinate (in chunks).
    pub z: u32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: u32, z: u32) -> Self {
        Self { x, z }
    }

    /// Converts a world position to the containing chunk coordinate.
    ///
    /// Negative world positions clamp to the grid origin; the coordinate
    /// space is unsigned.
    #[must_use]
    pub fn from_world(pos: Vec2) -> Self {
        Self {
            x: (pos.x / CHUNK_WORLD_SIZE).floor().max(0.0) as u32,
            z: (pos.y / CHUNK_WORLD_SIZE).floor().max(0.0) as u32,
        }
    }

    /// Number of grid cells covered by this coordinate taken as a span.
    #[inline]
    #[must_use]
    pub const fn area(self) -> u64 {
        self.x as u64 * self.z as u64
    }

    /// True iff both components are strictly less than `rhs`'s.
    #[inline]
    #[must_use]
    pub const fn all_lt(self, rhs: Self) -> bool {
        self.x < rhs.x && self.z < rhs.z
    }

    /// True iff both components are less than or equal to `rhs`'s.
    #[inline]
    #[must_use]
    pub const fn all_le(self, rhs: Self) -> bool {
        self.x <= rhs.x && self.z <= rhs.z
    }

    /// True iff both components are strictly greater than `rhs`'s.
    #[inline]
    #[must_use]
    pub const fn all_gt(self, rhs: Self) -> bool {
        self.x > rhs.x && self.z > rhs.z
    }

    /// True iff both components are greater than or equal to `rhs`'s.
    #[inline]
    #[must_use]
    pub const fn all_ge(self, rhs: Self) -> bool {
        self.x >= rhs.x && self.z >= rhs.z
    }

    /// Clamps both components to `max` componentwise.
    #[inline]
    #[must_use]
    pub fn min(self, max: Self) -> Self {
        Self {
            x: self.x.min(max.x),
            z: self.z.min(max.z),
        }
    }
}

impl Add for ChunkCoord {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.z + rhs.z)
    }
}

impl Sub for ChunkCoord {
    type Output = Self;

    /// Componentwise absolute difference, not a group subtraction.
    ///
    /// Callers treat the result as a span between two corners.
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x.abs_diff(rhs.x), self.z.abs_diff(rhs.z))
    }
}

impl Mul<u32> for ChunkCoord {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self {
        Self::new(self.x * rhs, self.z * rhs)
    }
}

impl Div<u32> for ChunkCoord {
    type Output = Self;

    fn div(self, rhs: u32) -> Self {
        Self::new(self.x / rhs, self.z / rhs)
    }
}
