use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// World up. Ground height is measured along this axis.
pub const UP: Vec3 = Vec3::Z;

/// Facing used whenever no better direction is known.
pub const DEFAULT_FORWARD: Vec3 = Vec3::Y;

/// Below this distance two points are treated as coincident for facing purposes.
pub const LOOK_EPSILON: f32 = 1e-5;

/// Position plus a (side, forward, up) basis, as the scene reports marker transforms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub origin: Vec3,
    pub side: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

impl Frame {
    /// Raw frame from an origin and forward axis. No normalization happens here.
    pub fn new(origin: Vec3, forward: Vec3) -> Self {
        Self {
            origin,
            side: forward.cross(UP),
            forward,
            up: UP,
        }
    }

    pub fn at(origin: Vec3) -> Self {
        Self::new(origin, DEFAULT_FORWARD)
    }

    /// Re-orthonormalize against the forward axis while keeping up fixed to +Z.
    ///
    /// The forward axis is flattened onto the ground plane first; a forward that is
    /// vertical (or zero) degrades to +Y.
    pub fn orthonormalized(self) -> Self {
        let flat = Vec3::new(self.forward.x, self.forward.y, 0.0);
        let forward = flat.try_normalize().unwrap_or(DEFAULT_FORWARD);
        Self {
            origin: self.origin,
            side: forward.cross(UP),
            forward,
            up: UP,
        }
    }

    /// Replace the vertical coordinate with the supplied ground height.
    pub fn grounded(mut self, ground: impl Fn(Vec3) -> f32) -> Self {
        self.origin = ground_clamp(self.origin, ground);
        self
    }
}

pub fn ground_clamp(mut position: Vec3, ground: impl Fn(Vec3) -> f32) -> Vec3 {
    position.z = ground(position);
    position
}

/// Unit vector from `from` toward `to`, or +Y when the points coincide.
pub fn look_direction(from: Vec3, to: Vec3) -> Vec3 {
    let delta = to - from;
    let len = delta.length();
    if len > LOOK_EPSILON {
        delta / len
    } else {
        DEFAULT_FORWARD
    }
}

/// Horizontal component, used for initial spawn directions.
pub fn planar(v: Vec3) -> Vec2 {
    Vec2::new(v.x, v.y)
}

pub fn nearly_equal(a: Vec3, b: Vec3, tolerance: f32) -> bool {
    a.distance(b) <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orthonormalize_flattens_tilted_forward() {
        let f = Frame::new(Vec3::ZERO, Vec3::new(0.0, 2.0, 2.0)).orthonormalized();
        assert!((f.forward - Vec3::Y).length() < 1e-6);
        assert_eq!(f.up, UP);
        assert!((f.side - Vec3::X).length() < 1e-6);
    }

    #[test]
    fn vertical_forward_degrades_to_plus_y() {
        let f = Frame::new(Vec3::ONE, Vec3::Z).orthonormalized();
        assert_eq!(f.forward, DEFAULT_FORWARD);
    }

    #[test]
    fn coincident_points_look_along_plus_y() {
        let p = Vec3::new(3.0, 4.0, 0.0);
        assert_eq!(look_direction(p, p), DEFAULT_FORWARD);
        let d = look_direction(Vec3::ZERO, Vec3::new(0.0, -5.0, 0.0));
        assert!((d - Vec3::NEG_Y).length() < 1e-6);
    }
}
