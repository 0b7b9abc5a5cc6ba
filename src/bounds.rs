//! Planar extents and tileset bounding volumes.

use serde::Deserialize;

/// Radius reported by a volume that has neither a sphere nor a box
pub const DEFAULT_RADIUS: f64 = 100.0;

#[derive(Clone, Copy, PartialEq, Debug)]
/// 2D bounding box
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Default for Extent {
    fn default() -> Self {
        Extent {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Extent {
        Extent {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// True until at least one coordinate has been added
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    #[inline]
    pub fn expand_xy(&mut self, x: f64, y: f64) {
        if x < self.min_x {
            self.min_x = x;
        }
        if y < self.min_y {
            self.min_y = y;
        }
        if x > self.max_x {
            self.max_x = x;
        }
        if y > self.max_y {
            self.max_y = y;
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }
}

/// Tile bounding volume.
///
/// Only the variants present in the tileset document are populated. Arrays
/// are kept at whatever length the document gives; [`center`](Self::center)
/// and [`radius`](Self::radius) skip a variant that is too short to use.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct BoundingVolume {
    /// center, then x, y and z half-axis vectors
    #[serde(rename = "box", default)]
    pub box_: Option<Vec<f64>>,
    /// west, south, east, north, min height, max height
    #[serde(default)]
    pub region: Option<Vec<f64>>,
    /// center, radius
    #[serde(default)]
    pub sphere: Option<Vec<f64>>,
}

impl BoundingVolume {
    pub fn from_box(b: [f64; 12]) -> Self {
        BoundingVolume {
            box_: Some(b.to_vec()),
            ..Default::default()
        }
    }

    pub fn from_region(r: [f64; 6]) -> Self {
        BoundingVolume {
            region: Some(r.to_vec()),
            ..Default::default()
        }
    }

    pub fn from_sphere(s: [f64; 4]) -> Self {
        BoundingVolume {
            sphere: Some(s.to_vec()),
            ..Default::default()
        }
    }

    /// Center used for camera distance.
    ///
    /// Box wins over sphere, sphere over region. A region center is the
    /// midpoint of its raw lon/lat/height values, not an ECEF position.
    pub fn center(&self) -> [f64; 3] {
        if let Some([x, y, z, ..]) = self.box_.as_deref() {
            [*x, *y, *z]
        } else if let Some([x, y, z, ..]) = self.sphere.as_deref() {
            [*x, *y, *z]
        } else if let Some([w, s, e, n, lo, hi, ..]) = self.region.as_deref() {
            [(w + e) / 2.0, (s + n) / 2.0, (lo + hi) / 2.0]
        } else {
            [0.0, 0.0, 0.0]
        }
    }

    /// Approximate bounding radius.
    pub fn radius(&self) -> f64 {
        if let Some([_, _, _, r, ..]) = self.sphere.as_deref() {
            *r
        } else if let Some(b) = self.box_.as_deref().filter(|b| b.len() >= 12) {
            let dx = b[3].abs() + b[6].abs() + b[9].abs();
            let dy = b[4].abs() + b[7].abs() + b[10].abs();
            let dz = b[5].abs() + b[8].abs() + b[11].abs();
            (dx * dx + dy * dy + dz * dz).sqrt()
        } else {
            DEFAULT_RADIUS
        }
    }

    pub fn is_empty(&self) -> bool {
        self.box_.is_none() && self.region.is_none() && self.sphere.is_none()
    }

    /// Euclidean distance from `point` to [`center`](Self::center).
    pub fn distance_to(&self, point: [f64; 3]) -> f64 {
        let c = self.center();
        let dx = c[0] - point[0];
        let dy = c[1] - point[1];
        let dz = c[2] - point[2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}
