use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of discrete sample points along each axis of a 3D grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridDimension {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl GridDimension {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Equal extent on all three axes.
    pub fn cube(extent: u32) -> Self {
        Self::new(extent, extent, extent)
    }

    /// Total number of samples (`x * y * z`), or `None` when the product
    /// does not fit in `usize`.
    pub fn checked_sample_count(&self) -> Option<usize> {
        (self.x as usize)
            .checked_mul(self.y as usize)?
            .checked_mul(self.z as usize)
    }

    /// Total number of samples, saturating at `usize::MAX`.
    pub fn sample_count(&self) -> usize {
        self.checked_sample_count().unwrap_or(usize::MAX)
    }

    /// True when every axis has at least one sample.
    pub fn is_non_empty(&self) -> bool {
        self.x > 0 && self.y > 0 && self.z > 0
    }

    pub fn is_cubic(&self) -> bool {
        self.x == self.y && self.y == self.z
    }

    pub fn as_array(&self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }
}

impl Default for GridDimension {
    fn default() -> Self {
        Self::cube(256)
    }
}

impl std::fmt::Display for GridDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

/// Timing information handed to every update and draw of the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameTime {
    /// Time passed since the previous frame.
    pub elapsed: Duration,
    /// Time passed since the loop started.
    pub total: Duration,
}

impl FrameTime {
    /// Time for the next frame, `dt` after this one.
    pub fn advance(&self, dt: Duration) -> Self {
        Self {
            elapsed: dt,
            total: self.total + dt,
        }
    }
}
