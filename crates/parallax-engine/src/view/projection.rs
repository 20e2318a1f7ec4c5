//! Projection matrix builders (GL clip convention, right-handed eye space).

use glam::{DMat3, DMat4, DVec4};

/// Off-axis perspective frustum; `l`, `r`, `b`, `t` are measured on the near plane.
pub fn off_axis_frustum(l: f64, r: f64, b: f64, t: f64, n: f64, f: f64) -> DMat4 {
    let (w, h, d) = (r - l, t - b, f - n);
    DMat4::from_cols(
        DVec4::new(2.0 * n / w, 0.0, 0.0, 0.0),
        DVec4::new(0.0, 2.0 * n / h, 0.0, 0.0),
        DVec4::new((r + l) / w, (t + b) / h, -(f + n) / d, -1.0),
        DVec4::new(0.0, 0.0, -2.0 * f * n / d, 0.0),
    )
}

/// [`off_axis_frustum`] with the far plane pushed to infinity.
pub fn off_axis_frustum_infinite(l: f64, r: f64, b: f64, t: f64, n: f64) -> DMat4 {
    let (w, h) = (r - l, t - b);
    DMat4::from_cols(
        DVec4::new(2.0 * n / w, 0.0, 0.0, 0.0),
        DVec4::new(0.0, 2.0 * n / h, 0.0, 0.0),
        DVec4::new((r + l) / w, (t + b) / h, -1.0, -1.0),
        DVec4::new(0.0, 0.0, -2.0 * n, 0.0),
    )
}

/// Orthographic box.
#[inline]
pub fn orthographic(l: f64, r: f64, b: f64, t: f64, n: f64, f: f64) -> DMat4 {
    DMat4::orthographic_rh_gl(l, r, b, t, n, f)
}

/// Shifts a projection by a sub-pixel offset.
///
/// `dx`/`dy` are in pixels; one pixel spans `2 / width` in NDC.
pub fn jittered(projection: DMat4, dx: f64, dy: f64, width_px: u32, height_px: u32) -> DMat4 {
    if dx == 0.0 && dy == 0.0 {
        return projection;
    }
    let ndc_x = 2.0 * dx / width_px.max(1) as f64;
    let ndc_y = 2.0 * dy / height_px.max(1) as f64;
    DMat4::from_translation(glam::DVec3::new(ndc_x, ndc_y, 0.0)) * projection
}

/// Linear part of `m` with translation dropped.
#[inline]
pub fn rotation_only(m: DMat4) -> DMat4 {
    DMat4::from_mat3(DMat3::from_mat4(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    const EPS: f64 = 1e-9;

    #[test]
    fn symmetric_frustum_matches_glam_perspective() {
        let n = 0.5;
        let f = 50.0;
        let fov_y = std::f64::consts::FRAC_PI_3;
        let aspect = 1.5;
        let t = n * (fov_y / 2.0).tan();
        let r = t * aspect;

        let ours = off_axis_frustum(-r, r, -t, t, n, f);
        let glam = DMat4::perspective_rh_gl(fov_y, aspect, n, f);
        assert!(ours.abs_diff_eq(glam, EPS));
    }

    #[test]
    fn frustum_maps_near_corners_to_ndc_corners() {
        let m = off_axis_frustum(-0.2, 0.6, -0.1, 0.3, 0.5, 10.0);
        let p = m.project_point3(DVec3::new(0.6, 0.3, -0.5));
        assert!(p.abs_diff_eq(DVec3::new(1.0, 1.0, -1.0), EPS));
        let q = m.project_point3(DVec3::new(-0.2 * 20.0, -0.1 * 20.0, -10.0));
        assert!(q.abs_diff_eq(DVec3::new(-1.0, -1.0, 1.0), EPS));
    }

    #[test]
    fn infinite_frustum_pushes_far_points_towards_one() {
        let m = off_axis_frustum_infinite(-1.0, 1.0, -1.0, 1.0, 1.0);
        let z = m.project_point3(DVec3::new(0.0, 0.0, -1.0e9)).z;
        assert!((z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn jitter_offsets_by_pixels() {
        let m = DMat4::IDENTITY;
        let j = jittered(m, 0.5, -0.25, 100, 50);
        let p = j.project_point3(DVec3::ZERO);
        assert!(p.abs_diff_eq(DVec3::new(0.01, -0.01, 0.0), EPS));
    }

    #[test]
    fn zero_jitter_is_identity_bitwise() {
        let m = off_axis_frustum(-1.0, 1.0, -1.0, 1.0, 0.1, 10.0);
        assert_eq!(jittered(m, 0.0, 0.0, 640, 480), m);
    }

    #[test]
    fn rotation_only_drops_translation() {
        let m = DMat4::from_rotation_y(0.3) * DMat4::from_translation(DVec3::new(4.0, 5.0, 6.0));
        let r = rotation_only(m);
        assert!(r.transform_point3(DVec3::ZERO).abs_diff_eq(DVec3::ZERO, EPS));
        let dir = DVec3::new(0.0, 0.0, -1.0);
        assert!(r.transform_vector3(dir).abs_diff_eq(m.transform_vector3(dir), EPS));
    }
}
