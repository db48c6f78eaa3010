use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::ValidationError;

/// A polygon annotation of an element, in pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Area {
    pub id: i64,
    pub label_id: i64,
    pub element_id: i64,
    pub area_points: Json<Vec<[f64; 2]>>,
}

impl Area {
    /// Checks that `points` describe a polygon.
    ///
    /// # Errors
    ///
    /// Returns an error for fewer than three points or a negative or non-finite coordinate.
    pub fn validate_points(points: &[[f64; 2]]) -> Result<(), ValidationError> {
        if points.len() < 3 {
            return Err(ValidationError::InvalidArea("an area needs at least 3 points"));
        }
        if points.iter().flatten().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(ValidationError::InvalidArea(
                "coordinates must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangle_is_valid() {
        assert!(Area::validate_points(&[[0.0, 0.0], [10.0, 0.0], [5.0, 8.5]]).is_ok());
    }

    #[test]
    fn test_degenerate_areas_are_rejected() {
        assert!(Area::validate_points(&[]).is_err());
        assert!(Area::validate_points(&[[0.0, 0.0], [1.0, 1.0]]).is_err());
        assert!(Area::validate_points(&[[0.0, 0.0], [1.0, -1.0], [2.0, 2.0]]).is_err());
        assert!(Area::validate_points(&[[0.0, f64::NAN], [1.0, 1.0], [2.0, 2.0]]).is_err());
    }
}
