//! Density Field: regular 3D grids of scalar samples describing solid/empty
//! volume data for the raycasting fragment stage.
//!
//! # Invariants
//! - Every axis has at least one sample.
//! - The flat sample array holds exactly `x * y * z` values, indexed
//!   `u + v * x + w * x * y`.
//! - A field is immutable once its generator returns it.

mod density;
mod generate;

pub use density::{DensityField, FieldError};
pub use generate::generate_solid_sphere;

pub fn crate_info() -> &'static str {
    "volterra-field v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("field"));
    }
}
