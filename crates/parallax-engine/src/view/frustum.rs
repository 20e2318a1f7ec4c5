use glam::{DMat4, DVec3};

/// Below this length an edge cross product is treated as degenerate.
const MIN_NORMAL_LENGTH: f64 = 1e-12;

/// Plane `dot(normal, p) + offset = 0`; positive side is inside.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Plane {
    pub normal: DVec3,
    pub offset: f64,
}

impl Plane {
    /// A plane every point is "inside" of (distance 0).
    pub const DEGENERATE: Plane = Plane {
        normal: DVec3::ZERO,
        offset: 0.0,
    };

    /// Plane through `a`, `b`, `c`; normal is `(b - a) × (c - a)` normalized.
    pub fn from_points(a: DVec3, b: DVec3, c: DVec3) -> Plane {
        let n = (b - a).cross(c - a);
        let len = n.length();
        if !(len > MIN_NORMAL_LENGTH) {
            return Plane::DEGENERATE;
        }
        let normal = n / len;
        Plane {
            normal,
            offset: -normal.dot(a),
        }
    }

    #[inline]
    pub fn signed_distance(&self, p: DVec3) -> f64 {
        self.normal.dot(p) + self.offset
    }

    #[inline]
    pub fn flipped(self) -> Plane {
        Plane {
            normal: -self.normal,
            offset: -self.offset,
        }
    }

    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.normal == DVec3::ZERO
    }
}

/// World-space view frustum.
///
/// Corner `i` is the image of clip-space corner
/// `(±1, ±1, ±1)` with bit 0 selecting +x, bit 1 +y and bit 2 +z (far).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far.
    pub planes: [Plane; 6],
    pub corners: [DVec3; 8],
}

impl Frustum {
    pub const LEFT: usize = 0;
    pub const RIGHT: usize = 1;
    pub const BOTTOM: usize = 2;
    pub const TOP: usize = 3;
    pub const NEAR: usize = 4;
    pub const FAR: usize = 5;

    /// Corner triples per plane. For a proper (non-mirroring) clip transform this
    /// winding yields inward normals.
    const WINDING: [[usize; 3]; 6] = [
        [0, 2, 4], // left   (x = -1)
        [1, 5, 3], // right  (x = +1)
        [0, 4, 1], // bottom (y = -1)
        [2, 3, 6], // top    (y = +1)
        [0, 1, 2], // near   (z = -1)
        [4, 6, 5], // far    (z = +1)
    ];

    /// Builds the frustum from the inverse of a world → clip transform.
    pub fn from_clip_inverse(clip_to_world: DMat4) -> Frustum {
        let mut corners = [DVec3::ZERO; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            let ndc = DVec3::new(
                if i & 1 != 0 { 1.0 } else { -1.0 },
                if i & 2 != 0 { 1.0 } else { -1.0 },
                if i & 4 != 0 { 1.0 } else { -1.0 },
            );
            *corner = clip_to_world.project_point3(ndc);
        }
        Self::from_corners(corners)
    }

    pub fn from_corners(corners: [DVec3; 8]) -> Frustum {
        let centroid = corners.iter().copied().sum::<DVec3>() / 8.0;

        let mut planes = [Plane::DEGENERATE; 6];
        for (plane, [a, b, c]) in planes.iter_mut().zip(Self::WINDING) {
            let p = Plane::from_points(corners[a], corners[b], corners[c]);
            // A mirroring world transform reverses the winding.
            *plane = if p.signed_distance(centroid) < 0.0 { p.flipped() } else { p };
        }

        Frustum { planes, corners }
    }

    /// `true` if `p` is on the inner side of every plane, within `eps`.
    pub fn contains_point(&self, p: DVec3, eps: f64) -> bool {
        self.planes.iter().all(|pl| pl.signed_distance(p) >= -eps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::projection::off_axis_frustum;

    fn sample() -> Frustum {
        let proj = off_axis_frustum(-0.3, 0.2, -0.1, 0.25, 0.5, 20.0);
        let view = DMat4::look_at_rh(DVec3::new(1.0, 2.0, 3.0), DVec3::ZERO, DVec3::Y);
        Frustum::from_clip_inverse((proj * view).inverse())
    }

    #[test]
    fn corners_lie_inside_their_own_frustum() {
        let f = sample();
        for c in f.corners {
            for pl in f.planes {
                assert!(pl.signed_distance(c) >= -1e-7 * (1.0 + c.length()));
            }
        }
    }

    #[test]
    fn normals_are_unit_length() {
        for pl in sample().planes {
            assert!((pl.normal.length() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn eye_point_is_outside_near_plane() {
        let f = sample();
        assert!(f.planes[Frustum::NEAR].signed_distance(DVec3::new(1.0, 2.0, 3.0)) < 0.0);
    }

    #[test]
    fn point_along_view_direction_is_inside() {
        let f = sample();
        let eye = DVec3::new(1.0, 2.0, 3.0);
        let fwd = (DVec3::ZERO - eye).normalize();
        let centroid = f.corners.iter().copied().sum::<DVec3>() / 8.0;
        assert!(f.contains_point(centroid, 0.0));
        assert!(!f.contains_point(eye - fwd, 0.0));
    }

    #[test]
    fn mirrored_transform_still_yields_inward_planes() {
        let proj = off_axis_frustum(-1.0, 1.0, -1.0, 1.0, 1.0, 10.0);
        let mirror = DMat4::from_scale(DVec3::new(-1.0, 1.0, 1.0));
        let f = Frustum::from_clip_inverse((proj * mirror).inverse());
        let centroid = f.corners.iter().copied().sum::<DVec3>() / 8.0;
        assert!(f.planes.iter().all(|p| p.signed_distance(centroid) > 0.0));
    }

    #[test]
    fn collinear_points_give_degenerate_plane() {
        let p = Plane::from_points(DVec3::ZERO, DVec3::X, DVec3::X * 2.0);
        assert!(p.is_degenerate());
        assert_eq!(p.signed_distance(DVec3::new(5.0, 5.0, 5.0)), 0.0);
    }
}
