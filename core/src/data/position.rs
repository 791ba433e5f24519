use serde::{Deserialize, Serialize};

/// Orientation quaternion attached to a calibration or estimated position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Orientation {
    pub fn identity() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }

    pub fn components(&self) -> [f64; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

/// Absolute position in a local metric frame. 2D positions keep `z` at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
}

impl Position {
    pub fn new_2d(x: f64, y: f64) -> Self {
        Self::new_3d(x, y, 0.0)
    }

    pub fn new_3d(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            orientation: None,
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn coordinates(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Copy of this position with the coordinate replaced; orientation is kept.
    pub fn with_coordinates(&self, coordinates: [f64; 3]) -> Self {
        Self {
            x: coordinates[0],
            y: coordinates[1],
            z: coordinates[2],
            orientation: self.orientation,
        }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let [x, y, z] = self.coordinates();
        let [ox, oy, oz] = other.coordinates();
        ((x - ox).powi(2) + (y - oy).powi(2) + (z - oz).powi(2)).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_coordinates_keeps_orientation() {
        let position = Position::new_2d(1.0, 2.0).with_orientation(Orientation::identity());
        let moved = position.with_coordinates([5.0, 6.0, 7.0]);
        assert_eq!(moved.coordinates(), [5.0, 6.0, 7.0]);
        assert_eq!(moved.orientation, Some(Orientation::identity()));
    }

    #[test]
    fn distance_between_planar_points() {
        let a = Position::new_2d(0.0, 0.0);
        let b = Position::new_2d(3.0, 4.0);
        assert_eq!(a.distance_to(&b), 5.0);
    }
}
