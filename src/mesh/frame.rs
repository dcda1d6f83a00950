//! Local metric plane around a reference coordinate

use crate::geo::Point;

/// Metres per degree of latitude on the WGS84 mean sphere
const METRES_PER_DEGREE: f64 = 111_319.490_793;

/// Equirectangular plane centred on `origin`, with longitude scaled by
/// `cos(latitude)` so distances are roughly isotropic near the origin
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    origin: Point,
    x_scale: f64,
}

impl LocalFrame {
    pub fn new(origin: Point) -> Self {
        let x_scale = METRES_PER_DEGREE * origin.y.to_radians().cos().max(1e-6);
        Self { origin, x_scale }
    }

    pub fn to_local(&self, p: Point) -> Point {
        Point::new(
            (p.x - self.origin.x) * self.x_scale,
            (p.y - self.origin.y) * METRES_PER_DEGREE,
        )
    }

    pub fn to_geo(&self, p: Point) -> Point {
        Point::new(
            self.origin.x + p.x / self.x_scale,
            self.origin.y + p.y / METRES_PER_DEGREE,
        )
    }
}
