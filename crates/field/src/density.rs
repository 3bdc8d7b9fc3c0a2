use volterra_common::GridDimension;

/// Errors from constructing a density field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("density field dimension out of range: each axis needs at least one sample and the grid must be addressable, got {value}")]
    DimensionOutOfRange { value: i64 },
}

/// A three dimensional density field with its sample points laid out in a
/// regular grid.
///
/// Samples are stored in one flat array, x varying fastest, then y, then z.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityField {
    dimension: GridDimension,
    scalar_values: Vec<f32>,
}

impl DensityField {
    /// Samples per axis used when no extent is given.
    pub const DEFAULT_DIMENSION: i32 = 256;

    /// An empty (all zero) cubic field with `extent` samples per axis.
    pub fn new(extent: i32) -> Result<Self, FieldError> {
        let extent = checked_extent(extent)?;
        Self::with_dimension(GridDimension::cube(extent))
    }

    /// An empty (all zero) field with the given extents.
    pub fn with_dimension(dimension: GridDimension) -> Result<Self, FieldError> {
        Self::from_fn(dimension, |_, _, _| 0.0)
    }

    /// Build a field by evaluating `sample` once for every grid point, in
    /// storage order.
    pub fn from_fn(
        dimension: GridDimension,
        mut sample: impl FnMut(u32, u32, u32) -> f32,
    ) -> Result<Self, FieldError> {
        for extent in dimension.as_array() {
            if extent == 0 {
                return Err(FieldError::DimensionOutOfRange { value: 0 });
            }
        }

        let sample_count = dimension
            .checked_sample_count()
            .filter(|&n| n <= isize::MAX as usize / std::mem::size_of::<f32>())
            .ok_or(FieldError::DimensionOutOfRange {
                value: dimension.as_array().into_iter().max().unwrap_or(0) as i64,
            })?;

        let mut scalar_values = Vec::with_capacity(sample_count);
        for w in 0..dimension.z {
            for v in 0..dimension.y {
                for u in 0..dimension.x {
                    scalar_values.push(sample(u, v, w));
                }
            }
        }

        Ok(Self {
            dimension,
            scalar_values,
        })
    }

    pub fn dimension(&self) -> GridDimension {
        self.dimension
    }

    /// The flat sample array (`index = u + v * x + w * x * y`).
    pub fn scalar_values(&self) -> &[f32] {
        &self.scalar_values
    }

    /// Total number of samples.
    pub fn len(&self) -> usize {
        self.scalar_values.len()
    }

    /// Always false: a valid field has at least one sample.
    pub fn is_empty(&self) -> bool {
        self.scalar_values.is_empty()
    }

    /// Flat index of grid point `(u, v, w)`, or `None` outside the grid.
    pub fn index_of(&self, u: u32, v: u32, w: u32) -> Option<usize> {
        let d = self.dimension;
        if u >= d.x || v >= d.y || w >= d.z {
            return None;
        }
        let (x, y) = (d.x as usize, d.y as usize);
        Some(u as usize + v as usize * x + w as usize * x * y)
    }

    /// Grid point of a flat index, or `None` past the end.
    pub fn coordinate_of(&self, index: usize) -> Option<(u32, u32, u32)> {
        if index >= self.scalar_values.len() {
            return None;
        }
        let (x, y) = (self.dimension.x as usize, self.dimension.y as usize);
        let u = index % x;
        let v = (index / x) % y;
        let w = index / (x * y);
        Some((u as u32, v as u32, w as u32))
    }

    /// Sample value at grid point `(u, v, w)`.
    pub fn sample(&self, u: u32, v: u32, w: u32) -> Option<f32> {
        self.index_of(u, v, w).map(|i| self.scalar_values[i])
    }

    /// Number of samples with a positive density.
    pub fn solid_count(&self) -> usize {
        self.scalar_values.iter().filter(|&&s| s > 0.0).count()
    }

    /// Share of solid samples in `[0, 1]`.
    pub fn solid_fraction(&self) -> f64 {
        self.solid_count() as f64 / self.len() as f64
    }
}

/// Validate a signed per-axis extent from the API edge.
pub(crate) fn checked_extent(extent: i32) -> Result<u32, FieldError> {
    if extent < 1 {
        return Err(FieldError::DimensionOutOfRange {
            value: extent as i64,
        });
    }
    Ok(extent as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_field_is_empty_volume() {
        let field = DensityField::new(4).unwrap();
        assert_eq!(field.len(), 64);
        assert_eq!(field.solid_count(), 0);
        assert!(!field.is_empty());
    }

    #[test]
    fn zero_and_negative_extent_rejected() {
        assert_eq!(
            DensityField::new(0),
            Err(FieldError::DimensionOutOfRange { value: 0 })
        );
        assert_eq!(
            DensityField::new(-3),
            Err(FieldError::DimensionOutOfRange { value: -3 })
        );
    }

    #[test]
    fn zero_axis_rejected() {
        let result = DensityField::with_dimension(GridDimension::new(4, 0, 4));
        assert!(result.is_err());
    }

    #[test]
    fn index_formula_x_fastest() {
        let field = DensityField::with_dimension(GridDimension::new(3, 4, 5)).unwrap();
        assert_eq!(field.index_of(0, 0, 0), Some(0));
        assert_eq!(field.index_of(1, 0, 0), Some(1));
        assert_eq!(field.index_of(0, 1, 0), Some(3));
        assert_eq!(field.index_of(0, 0, 1), Some(12));
        assert_eq!(field.index_of(2, 3, 4), Some(2 + 3 * 3 + 4 * 12));
        assert_eq!(field.index_of(3, 0, 0), None);
    }

    #[test]
    fn coordinate_inverts_index() {
        let field = DensityField::with_dimension(GridDimension::new(3, 4, 5)).unwrap();
        for i in [0, 1, 7, 13, 59] {
            let (u, v, w) = field.coordinate_of(i).unwrap();
            assert_eq!(field.index_of(u, v, w), Some(i));
        }
        assert_eq!(field.coordinate_of(60), None);
    }

    #[test]
    fn from_fn_visits_in_storage_order() {
        let dim = GridDimension::new(2, 2, 2);
        let field = DensityField::from_fn(dim, |u, v, w| (u + 10 * v + 100 * w) as f32).unwrap();
        assert_eq!(
            field.scalar_values(),
            &[0.0, 1.0, 10.0, 11.0, 100.0, 101.0, 110.0, 111.0]
        );
        assert_eq!(field.sample(1, 0, 1), Some(101.0));
    }
}
