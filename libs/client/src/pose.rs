use std::fmt;

use serde::{Deserialize, Serialize};

use crate::structs::StructType;

/// Planar robot pose: position in meters, heading in radians
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2d {
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
}

impl Pose2d {
    pub fn new(x: f64, y: f64, rotation: f64) -> Self {
        Self { x, y, rotation }
    }

    /// Heading in degrees
    pub fn degrees(&self) -> f64 {
        self.rotation.to_degrees()
    }
}

impl StructType for Pose2d {
    const TYPE_ID: &'static str = "Pose2d";
}

impl fmt::Display for Pose2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose2d(x: {:.3}, y: {:.3}, heading: {:.1}°)",
            self.x,
            self.y,
            self.degrees()
        )
    }
}
