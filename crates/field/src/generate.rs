use glam::DVec3;
use volterra_common::GridDimension;

use crate::density::{DensityField, FieldError, checked_extent};

/// Generate a cubic field of `dimension³` samples holding a solid sphere.
///
/// The sphere is centred in the grid at `(d-1)/2` on every axis with radius
/// `(d-1)/2`. Samples whose distance to the centre does not exceed the radius
/// are 1.0, all others 0.0. Points exactly on the boundary count as inside.
pub fn generate_solid_sphere(dimension: i32) -> Result<DensityField, FieldError> {
    let extent = checked_extent(dimension)?;
    let _span = tracing::debug_span!("generate_solid_sphere", dimension).entered();

    let half = (extent - 1) as f64 / 2.0;
    let center = DVec3::splat(half);
    let radius = half;

    let field = DensityField::from_fn(GridDimension::cube(extent), |u, v, w| {
        let point = DVec3::new(u as f64, v as f64, w as f64);
        if point.distance(center) - radius <= 0.0 {
            1.0
        } else {
            0.0
        }
    })?;

    tracing::debug!(
        samples = field.len(),
        solid = field.solid_count(),
        "solid sphere generated"
    );
    Ok(field)
}

impl DensityField {
    /// See [`generate_solid_sphere`].
    pub fn solid_sphere(dimension: i32) -> Result<Self, FieldError> {
        generate_solid_sphere(dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Inside test in exact integer arithmetic: |2p - (d-1)|² <= (d-1)².
    fn inside_exact(d: i64, u: i64, v: i64, w: i64) -> bool {
        let c = d - 1;
        let sq = |p: i64| (2 * p - c) * (2 * p - c);
        sq(u) + sq(v) + sq(w) <= c * c
    }

    #[test]
    fn sample_count_is_cube_of_dimension() {
        for d in 1..=12 {
            let field = generate_solid_sphere(d).unwrap();
            assert_eq!(field.len(), (d * d * d) as usize);
            assert_eq!(field.dimension(), GridDimension::cube(d as u32));
        }
    }

    #[test]
    fn samples_match_sphere_membership() {
        for d in 1..=9u32 {
            let field = generate_solid_sphere(d as i32).unwrap();
            for w in 0..d {
                for v in 0..d {
                    for u in 0..d {
                        let expected =
                            inside_exact(d as i64, u as i64, v as i64, w as i64);
                        let value = field.sample(u, v, w).unwrap();
                        assert_eq!(value, if expected { 1.0 } else { 0.0 }, "d={d} ({u},{v},{w})");
                    }
                }
            }
        }
    }

    #[test]
    fn boundary_points_are_inside() {
        // d = 5: centre 2, radius 2; (0, 2, 2) lies exactly on the surface.
        let field = generate_solid_sphere(5).unwrap();
        assert_eq!(field.sample(0, 2, 2), Some(1.0));
        assert_eq!(field.sample(4, 2, 2), Some(1.0));
        assert_eq!(field.sample(2, 2, 0), Some(1.0));
        assert_eq!(field.sample(0, 0, 0), Some(0.0));
    }

    #[test]
    fn single_sample_field_is_solid() {
        let field = generate_solid_sphere(1).unwrap();
        assert_eq!(field.scalar_values(), &[1.0]);
    }

    #[test]
    fn two_sample_field_is_empty() {
        // Radius 0.5, every corner is sqrt(0.75) from the centre.
        let field = generate_solid_sphere(2).unwrap();
        assert_eq!(field.solid_count(), 0);
    }

    #[test]
    fn only_binary_values() {
        let field = generate_solid_sphere(16).unwrap();
        assert!(field.scalar_values().iter().all(|&s| s == 0.0 || s == 1.0));
        assert!(field.solid_count() > 0);
    }

    #[test]
    fn solid_fraction_approaches_sphere_volume() {
        // Volume of a sphere inscribed in a cube is pi/6 of the cube.
        let field = generate_solid_sphere(64).unwrap();
        let expected = std::f64::consts::PI / 6.0;
        assert!((field.solid_fraction() - expected).abs() < 0.05);
    }

    #[test]
    fn zero_and_negative_dimension_fail() {
        assert_eq!(
            generate_solid_sphere(0),
            Err(FieldError::DimensionOutOfRange { value: 0 })
        );
        assert!(matches!(
            generate_solid_sphere(-1),
            Err(FieldError::DimensionOutOfRange { value: -1 })
        ));
        assert!(DensityField::solid_sphere(i32::MIN).is_err());
    }

    #[test]
    fn unaddressable_dimension_fails() {
        assert_eq!(
            generate_solid_sphere(i32::MAX),
            Err(FieldError::DimensionOutOfRange {
                value: i32::MAX as i64
            })
        );
    }

    #[test]
    fn symmetric_about_center() {
        let d = 11u32;
        let field = generate_solid_sphere(d as i32).unwrap();
        for w in 0..d {
            for v in 0..d {
                for u in 0..d {
                    assert_eq!(
                        field.sample(u, v, w),
                        field.sample(d - 1 - u, d - 1 - v, d - 1 - w)
                    );
                }
            }
        }
    }
}
