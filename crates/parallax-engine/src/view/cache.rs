use glam::{DMat4, DVec3};

use crate::coords::PixelRect;

use super::projection::{off_axis_frustum, off_axis_frustum_infinite, orthographic, rotation_only};
use super::{
    ClipPolicy, DirtyFlags, EyepointPolicy, Frustum, MonoscopicPolicy, ProjectionPolicy, Screen,
    ScreenScalePolicy, ViewPolicy, WindowResizePolicy,
};

/// Smallest near distance accepted for perspective projections (metres).
const MIN_NEAR: f64 = 1e-4;
/// Smallest eye-to-screen distance accepted for perspective projections (metres).
const MIN_EYE_DISTANCE: f64 = 1e-6;
/// `|det|` relative to the product of column lengths below which a transform is
/// treated as singular. The ratio is 1 for orthogonal columns and does not
/// change under uniform scale.
const SINGULAR_RATIO: f64 = 1e-12;

/// Snapshot of everything a refresh reads.
///
/// Taken under the surface's input lock, so a view-platform transform published
/// mid-refresh lands in the next snapshot instead of tearing this one.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewInputs {
    pub window: PixelRect,
    pub screen: Screen,
    pub policy: ViewPolicy,
    pub stereo_capable: bool,

    /// View platform → world, published by the scene thread.
    pub vpc_to_world: DMat4,
    /// Physical-environment calibration, used when coexistence centring is off.
    pub coexistence_to_tracker_base: DMat4,
    /// Head-tracked eye positions in image-plate space (left, right).
    pub tracked_eyes: Option<[DVec3; 2]>,
    /// Back distance (virtual units from the eye) imposed by an active clip volume.
    pub clip_override: Option<f64>,
}

impl ViewInputs {
    pub fn new(window: PixelRect, screen: Screen) -> Self {
        Self {
            window,
            screen,
            policy: ViewPolicy::default(),
            stereo_capable: false,
            vpc_to_world: DMat4::IDENTITY,
            coexistence_to_tracker_base: DMat4::IDENTITY,
            tracked_eyes: None,
            clip_override: None,
        }
    }

    /// Stereo needs both a capable surface and a policy asking for it.
    #[inline]
    pub fn stereo_in_use(&self) -> bool {
        self.stereo_capable && self.policy.stereo_enable
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];
}

/// Physical window rectangle on the image plate (metres).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WindowExtent {
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub top: f64,
}

impl WindowExtent {
    fn from_pixels(rect: PixelRect, screen: &Screen) -> Self {
        let (w, h) = rect.target_size();
        let mpp = screen.meters_per_pixel;
        let left = rect.x as f64 * mpp.x;
        // Window y grows downwards; the image plate's grows upwards.
        let bottom = (screen.height_px as f64 - rect.y as f64 - h as f64) * mpp.y;
        Self {
            left,
            right: left + w as f64 * mpp.x,
            bottom,
            top: bottom + h as f64 * mpp.y,
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    #[inline]
    pub fn center(&self) -> DVec3 {
        DVec3::new(
            (self.left + self.right) * 0.5,
            (self.bottom + self.top) * 0.5,
            0.0,
        )
    }
}

/// Derived state for one eye.
///
/// `infinite_*` matrices are only meaningful when [`DerivedView::has_infinite`] is set;
/// otherwise they are identity.
#[derive(Debug, Clone, PartialEq)]
pub struct EyeView {
    /// Eye position in image-plate coordinates.
    pub position: DVec3,
    pub projection: DMat4,
    pub infinite_projection: DMat4,
    /// View platform → eye.
    pub view: DMat4,
    /// View platform → eye with translation dropped.
    pub infinite_view: DMat4,
    /// World-space frustum of the finite projection.
    pub frustum: Frustum,
    /// Physical clip distances from the eye (metres).
    pub near: f64,
    pub far: f64,
}

impl EyeView {
    /// World → clip for the finite pass.
    #[inline]
    pub fn clip_from_world(&self, world_to_vpc: DMat4) -> DMat4 {
        self.projection * self.view * world_to_vpc
    }
}

/// Output of a refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedView {
    pub window: WindowExtent,
    pub left: EyeView,
    pub right: EyeView,
    pub stereo: bool,
    pub has_infinite: bool,

    pub world_to_vpc: DMat4,
    pub vpc_to_world: DMat4,
    /// World → view platform with translation dropped, for background geometry.
    pub infinite_world_to_vpc: DMat4,
    pub coexistence_to_image_plate: DMat4,

    pub vpc_to_coexistence_scale: f64,
    /// Virtual-world units covered by one window pixel.
    pub window_to_world_scale: f64,
}

impl DerivedView {
    #[inline]
    pub fn eye(&self, eye: Eye) -> &EyeView {
        match eye {
            Eye::Left => &self.left,
            Eye::Right => &self.right,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RefreshResult {
    /// Nothing relevant changed; the previous derivation was kept untouched.
    Cached,
    Recomputed,
}

/// Per-surface memoization of [`DerivedView`].
#[derive(Debug, Default)]
pub struct ViewDerivationCache {
    derived: Option<DerivedView>,
    last_demand_infinite: bool,
    recomputations: u64,
}

impl ViewDerivationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest derivation, `None` before the first refresh.
    #[inline]
    pub fn derived(&self) -> Option<&DerivedView> {
        self.derived.as_ref()
    }

    /// Number of full recomputations so far.
    #[inline]
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    /// Forces the next refresh to recompute.
    pub fn invalidate(&mut self) {
        self.derived = None;
    }

    /// Recomputes the derivation if `dirty` touches view state, if the background
    /// requirement changed, or if nothing was derived yet. Otherwise leaves the
    /// previous result bit-for-bit unchanged.
    pub fn refresh(
        &mut self,
        inputs: &ViewInputs,
        dirty: DirtyFlags,
        demand_infinite: bool,
    ) -> RefreshResult {
        let stale = dirty.intersects(DirtyFlags::VIEW_CACHE)
            || self.derived.is_none()
            || demand_infinite != self.last_demand_infinite;

        if !stale {
            return RefreshResult::Cached;
        }

        self.derived = Some(derive(inputs, demand_infinite));
        self.last_demand_infinite = demand_infinite;
        self.recomputations += 1;

        log::trace!(
            "view derivation recomputed (dirty={dirty:?}, infinite={demand_infinite}, n={})",
            self.recomputations
        );
        RefreshResult::Recomputed
    }
}

fn derive(inputs: &ViewInputs, demand_infinite: bool) -> DerivedView {
    let policy = &inputs.policy;
    let window = WindowExtent::from_pixels(inputs.window, &inputs.screen);

    let (vpc_to_world, world_to_vpc) = invert_or_identity("view platform", inputs.vpc_to_world);
    let world_scale = positive_or_one(vpc_to_world.x_axis.truncate().length());

    let scale = coexistence_scale(policy, &inputs.screen, &window);
    let vpc_to_coexistence = DMat4::from_scale(DVec3::splat(scale));
    let coexistence_to_image_plate = if policy.coexistence_centering {
        DMat4::from_translation(window.center())
    } else {
        inputs.screen.tracker_base_to_image_plate * inputs.coexistence_to_tracker_base
    };

    let stereo = inputs.stereo_in_use();
    let [left_pos, right_pos] = eye_positions(inputs, &window, coexistence_to_image_plate, stereo);

    let chain = EyeChain {
        policy,
        window: &window,
        clip_override: inputs.clip_override,
        virtual_to_physical: scale / world_scale,
        vpc_to_image_plate: coexistence_to_image_plate * vpc_to_coexistence,
        world_to_vpc,
        demand_infinite,
    };

    DerivedView {
        window,
        left: chain.derive_eye(left_pos),
        right: chain.derive_eye(right_pos),
        stereo,
        has_infinite: demand_infinite,
        world_to_vpc,
        vpc_to_world,
        infinite_world_to_vpc: rotation_only(world_to_vpc),
        coexistence_to_image_plate,
        vpc_to_coexistence_scale: scale,
        window_to_world_scale: inputs.screen.meters_per_pixel.x / scale * world_scale,
    }
}

/// Per-eye derivation parameters shared by both eyes.
struct EyeChain<'a> {
    policy: &'a ViewPolicy,
    window: &'a WindowExtent,
    clip_override: Option<f64>,
    virtual_to_physical: f64,
    vpc_to_image_plate: DMat4,
    world_to_vpc: DMat4,
    demand_infinite: bool,
}

impl EyeChain<'_> {
    fn derive_eye(&self, position: DVec3) -> EyeView {
        let perspective = self.policy.projection == ProjectionPolicy::Perspective;

        let mut eye = position;
        if perspective && !(eye.z > MIN_EYE_DISTANCE) {
            log::warn!("eye at z={} is not in front of the image plate; clamping", eye.z);
            eye.z = MIN_EYE_DISTANCE;
        }

        let (near, far) = self.clip_range(eye.z, perspective);

        // Window edges relative to the eye, on the image plate.
        let l = self.window.left - eye.x;
        let r = self.window.right - eye.x;
        let b = self.window.bottom - eye.y;
        let t = self.window.top - eye.y;

        let (projection, infinite_projection) = if perspective {
            let k = near / eye.z;
            let finite = off_axis_frustum(l * k, r * k, b * k, t * k, near, far);
            let infinite = if self.demand_infinite {
                off_axis_frustum_infinite(l * k, r * k, b * k, t * k, near)
            } else {
                DMat4::IDENTITY
            };
            (finite, infinite)
        } else {
            let finite = orthographic(l, r, b, t, near, far);
            (finite, if self.demand_infinite { finite } else { DMat4::IDENTITY })
        };

        let view = DMat4::from_translation(-eye) * self.vpc_to_image_plate;
        let infinite_view = if self.demand_infinite {
            rotation_only(view)
        } else {
            DMat4::IDENTITY
        };

        let clip_from_world = projection * view * self.world_to_vpc;
        let (_, clip_to_world) = invert_or_identity("clip", clip_from_world);

        EyeView {
            position: eye,
            projection,
            infinite_projection,
            view,
            infinite_view,
            frustum: Frustum::from_clip_inverse(clip_to_world),
            near,
            far,
        }
    }

    fn clip_range(&self, eye_z: f64, perspective: bool) -> (f64, f64) {
        let policy = self.policy;
        let mut near = clip_distance(
            policy.front_clip,
            policy.front_clip_distance,
            eye_z,
            self.virtual_to_physical,
        );
        let mut far = match self.clip_override {
            Some(back) => back * self.virtual_to_physical,
            None => clip_distance(
                policy.back_clip,
                policy.back_clip_distance,
                eye_z,
                self.virtual_to_physical,
            ),
        };

        if perspective && !(near >= MIN_NEAR) {
            log::warn!("front clip distance {near} too small for perspective; using {MIN_NEAR}");
            near = MIN_NEAR;
        }
        if !(far > near) {
            log::warn!("back clip distance {far} not beyond front clip {near}; widening");
            far = near.abs().max(MIN_NEAR) * 2.0 + near;
        }
        (near, far)
    }
}

fn clip_distance(policy: ClipPolicy, distance: f64, eye_z: f64, virtual_to_physical: f64) -> f64 {
    let physical = if policy.is_virtual() {
        distance * virtual_to_physical
    } else {
        distance
    };
    if policy.is_screen_relative() {
        eye_z + physical
    } else {
        physical
    }
}

fn coexistence_scale(policy: &ViewPolicy, screen: &Screen, window: &WindowExtent) -> f64 {
    let base = match policy.screen_scale_policy {
        ScreenScalePolicy::ScreenSize => screen.physical_width() * 0.5,
        ScreenScalePolicy::Explicit => policy.screen_scale,
    };
    let scale = match policy.window_resize {
        WindowResizePolicy::PhysicalWorld => base,
        WindowResizePolicy::VirtualWorld => base * window.width() / screen.physical_width(),
    };
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        log::warn!("view platform scale {scale} is not positive; using 1.0");
        1.0
    }
}

fn eye_positions(
    inputs: &ViewInputs,
    window: &WindowExtent,
    coexistence_to_image_plate: DMat4,
    stereo: bool,
) -> [DVec3; 2] {
    let policy = &inputs.policy;

    let (left, right) = match policy.eyepoint {
        EyepointPolicy::FixedFieldOfView => {
            let c = window.center();
            let fov = policy.field_of_view.clamp(1e-3, std::f64::consts::PI - 1e-3);
            let z = window.width() * 0.5 / (fov * 0.5).tan();
            let half = policy.interocular_distance * 0.5;
            (DVec3::new(c.x - half, c.y, z), DVec3::new(c.x + half, c.y, z))
        }
        EyepointPolicy::RelativeToWindow => {
            let origin = DVec3::new(window.left, window.bottom, 0.0);
            (
                origin + policy.left_manual_eye_in_image_plate,
                origin + policy.right_manual_eye_in_image_plate,
            )
        }
        EyepointPolicy::RelativeToScreen => match inputs.tracked_eyes {
            Some([l, r]) => (l, r),
            None => (
                policy.left_manual_eye_in_image_plate,
                policy.right_manual_eye_in_image_plate,
            ),
        },
        EyepointPolicy::RelativeToCoexistence => (
            coexistence_to_image_plate.transform_point3(policy.left_manual_eye_in_coexistence),
            coexistence_to_image_plate.transform_point3(policy.right_manual_eye_in_coexistence),
        ),
    };

    if stereo {
        return [left, right];
    }
    let mono = match policy.monoscopic {
        MonoscopicPolicy::CyclopeanEye => (left + right) * 0.5,
        MonoscopicPolicy::LeftEye => left,
        MonoscopicPolicy::RightEye => right,
    };
    [mono, mono]
}

/// Returns `(m, m⁻¹)`, or identity for both when `m` is singular.
fn invert_or_identity(what: &str, m: DMat4) -> (DMat4, DMat4) {
    let det = m.determinant();
    let norms = m.x_axis.length() * m.y_axis.length() * m.z_axis.length() * m.w_axis.length();
    let ratio = det.abs() / norms;
    if det.is_finite() && norms.is_finite() && norms > 0.0 && ratio > SINGULAR_RATIO {
        let inv = m.inverse();
        if inv.is_finite() {
            return (m, inv);
        }
    }
    log::warn!("{what} transform is singular (det={det}); using identity");
    (DMat4::IDENTITY, DMat4::IDENTITY)
}

fn positive_or_one(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { 1.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> ViewInputs {
        let screen = Screen::new(1920, 1080);
        ViewInputs::new(PixelRect::new(320, 180, 1280, 720), screen)
    }

    fn derived(cache: &ViewDerivationCache) -> &DerivedView {
        cache.derived().expect("refreshed")
    }

    // ── memoization ───────────────────────────────────────────────────────

    #[test]
    fn clean_refresh_is_bit_identical() {
        let mut cache = ViewDerivationCache::new();
        let inp = inputs();
        assert_eq!(cache.refresh(&inp, DirtyFlags::empty(), false), RefreshResult::Recomputed);
        let first = derived(&cache).clone();

        assert_eq!(cache.refresh(&inp, DirtyFlags::empty(), false), RefreshResult::Cached);
        assert_eq!(derived(&cache), &first);
        assert_eq!(cache.recomputations(), 1);
    }

    #[test]
    fn clean_refresh_ignores_changed_inputs() {
        // The cache trusts the dirty bits; unflagged changes are not picked up.
        let mut cache = ViewDerivationCache::new();
        let mut inp = inputs();
        cache.refresh(&inp, DirtyFlags::empty(), false);
        let first = derived(&cache).clone();

        inp.window = PixelRect::new(0, 0, 100, 100);
        assert_eq!(cache.refresh(&inp, DirtyFlags::LIGHTS, false), RefreshResult::Cached);
        assert_eq!(derived(&cache), &first);
    }

    #[test]
    fn view_dirty_bit_forces_recompute() {
        let mut cache = ViewDerivationCache::new();
        let mut inp = inputs();
        cache.refresh(&inp, DirtyFlags::empty(), false);

        inp.window = PixelRect::new(0, 0, 640, 480);
        assert_eq!(cache.refresh(&inp, DirtyFlags::CANVAS, false), RefreshResult::Recomputed);
        assert_eq!(cache.recomputations(), 2);
    }

    #[test]
    fn infinite_demand_change_forces_recompute() {
        let mut cache = ViewDerivationCache::new();
        let inp = inputs();
        cache.refresh(&inp, DirtyFlags::empty(), false);
        assert!(!derived(&cache).has_infinite);

        assert_eq!(cache.refresh(&inp, DirtyFlags::empty(), true), RefreshResult::Recomputed);
        assert!(derived(&cache).has_infinite);
        assert_eq!(cache.refresh(&inp, DirtyFlags::empty(), true), RefreshResult::Cached);
    }

    // ── frustum ───────────────────────────────────────────────────────────

    #[test]
    fn corners_satisfy_their_own_planes() {
        let mut inp = inputs();
        inp.stereo_capable = true;
        inp.vpc_to_world = DMat4::from_rotation_y(0.7) * DMat4::from_translation(DVec3::new(1.0, 2.0, 5.0));

        let mut cache = ViewDerivationCache::new();
        cache.refresh(&inp, DirtyFlags::all(), true);
        for eye in Eye::BOTH {
            let f = derived(&cache).eye(eye).frustum;
            for c in f.corners {
                for pl in f.planes {
                    assert!(pl.signed_distance(c) >= -1e-6, "corner {c:?} outside {pl:?}");
                }
            }
        }
    }

    #[test]
    fn corners_reproject_to_clip_cube() {
        let mut cache = ViewDerivationCache::new();
        let inp = inputs();
        cache.refresh(&inp, DirtyFlags::all(), false);
        let d = derived(&cache);
        let clip = d.left.clip_from_world(d.world_to_vpc);
        let p = clip.project_point3(d.left.frustum.corners[7]);
        assert!(p.abs_diff_eq(DVec3::ONE, 1e-6));
    }

    // ── eyes ──────────────────────────────────────────────────────────────

    #[test]
    fn mono_surface_has_identical_eyes() {
        let mut cache = ViewDerivationCache::new();
        let inp = inputs();
        assert!(!inp.stereo_in_use());
        cache.refresh(&inp, DirtyFlags::all(), true);
        let d = derived(&cache);
        assert_eq!(d.left, d.right);
    }

    #[test]
    fn stereo_surface_separates_eyes_by_interocular_distance() {
        let mut inp = inputs();
        inp.stereo_capable = true;
        let mut cache = ViewDerivationCache::new();
        cache.refresh(&inp, DirtyFlags::all(), false);
        let d = derived(&cache);
        let sep = d.right.position - d.left.position;
        assert!((sep.x - inp.policy.interocular_distance).abs() < 1e-12);
        assert_ne!(d.left.projection, d.right.projection);
    }

    #[test]
    fn fixed_fov_places_eye_at_fov_distance() {
        let inp = inputs();
        let mut cache = ViewDerivationCache::new();
        cache.refresh(&inp, DirtyFlags::all(), false);
        let d = derived(&cache);
        let expected = d.window.width() * 0.5 / (inp.policy.field_of_view * 0.5).tan();
        assert!((d.left.position.z - expected).abs() < 1e-12);
        assert!((d.left.position.x - d.window.center().x).abs() < 1e-12);
    }

    #[test]
    fn monoscopic_left_eye_policy_uses_left_eye() {
        let mut inp = inputs();
        inp.policy.eyepoint = EyepointPolicy::RelativeToScreen;
        inp.policy.monoscopic = MonoscopicPolicy::LeftEye;
        let mut cache = ViewDerivationCache::new();
        cache.refresh(&inp, DirtyFlags::all(), false);
        assert_eq!(derived(&cache).right.position, inp.policy.left_manual_eye_in_image_plate);
    }

    #[test]
    fn window_relative_eye_follows_window() {
        let mut inp = inputs();
        inp.policy.eyepoint = EyepointPolicy::RelativeToWindow;
        let mut cache = ViewDerivationCache::new();
        cache.refresh(&inp, DirtyFlags::all(), false);
        let before = derived(&cache).left.position;

        inp.window.x += 90;
        cache.refresh(&inp, DirtyFlags::CANVAS, false);
        let after = derived(&cache).left.position;
        let mpp = inp.screen.meters_per_pixel.x;
        assert!((after.x - before.x - 90.0 * mpp).abs() < 1e-12);
        assert_eq!(after.z, before.z);
    }

    #[test]
    fn tracked_eyes_override_manual_screen_eyes() {
        let mut inp = inputs();
        inp.stereo_capable = true;
        inp.policy.eyepoint = EyepointPolicy::RelativeToScreen;
        let tracked = [DVec3::new(0.2, 0.1, 0.5), DVec3::new(0.27, 0.1, 0.5)];
        inp.tracked_eyes = Some(tracked);
        let mut cache = ViewDerivationCache::new();
        cache.refresh(&inp, DirtyFlags::all(), false);
        assert_eq!(derived(&cache).left.position, tracked[0]);
        assert_eq!(derived(&cache).right.position, tracked[1]);
    }

    #[test]
    fn coexistence_eye_is_offset_from_window_centre() {
        let mut inp = inputs();
        inp.stereo_capable = true;
        inp.policy.eyepoint = EyepointPolicy::RelativeToCoexistence;
        let mut cache = ViewDerivationCache::new();
        cache.refresh(&inp, DirtyFlags::all(), false);
        let d = derived(&cache);
        let expected = d.window.center() + inp.policy.left_manual_eye_in_coexistence;
        assert!(d.left.position.abs_diff_eq(expected, 1e-12));
    }

    // ── clipping ──────────────────────────────────────────────────────────

    #[test]
    fn screen_relative_clip_adds_eye_distance() {
        let mut inp = inputs();
        inp.policy.back_clip = ClipPolicy::PhysicalScreen;
        inp.policy.back_clip_distance = 2.0;
        let mut cache = ViewDerivationCache::new();
        cache.refresh(&inp, DirtyFlags::all(), false);
        let e = &derived(&cache).left;
        assert!((e.far - (e.position.z + 2.0)).abs() < 1e-12);
    }

    #[test]
    fn virtual_clip_scales_by_view_platform_scale() {
        let mut inp = inputs();
        inp.policy.front_clip = ClipPolicy::VirtualEye;
        inp.policy.front_clip_distance = 0.5;
        inp.policy.screen_scale_policy = ScreenScalePolicy::Explicit;
        inp.policy.screen_scale = 0.25;
        let mut cache = ViewDerivationCache::new();
        cache.refresh(&inp, DirtyFlags::all(), false);
        assert!((derived(&cache).left.near - 0.125).abs() < 1e-12);
    }

    #[test]
    fn clip_volume_overrides_back_distance() {
        let mut inp = inputs();
        inp.policy.screen_scale_policy = ScreenScalePolicy::Explicit;
        inp.policy.screen_scale = 1.0;
        inp.clip_override = Some(3.5);
        let mut cache = ViewDerivationCache::new();
        cache.refresh(&inp, DirtyFlags::all(), false);
        assert!((derived(&cache).left.far - 3.5).abs() < 1e-12);
    }

    // ── transforms ────────────────────────────────────────────────────────

    #[test]
    fn singular_view_platform_degrades_to_identity() {
        let mut inp = inputs();
        inp.vpc_to_world = DMat4::from_scale(DVec3::new(1.0, 0.0, 1.0));
        let mut cache = ViewDerivationCache::new();
        cache.refresh(&inp, DirtyFlags::all(), false);
        let d = derived(&cache);
        assert_eq!(d.world_to_vpc, DMat4::IDENTITY);
        assert!(d.left.frustum.corners.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn uniformly_scaled_view_platform_is_not_singular() {
        for scale in [1e-6, 1e6] {
            let mut inp = inputs();
            inp.vpc_to_world = DMat4::from_scale(DVec3::splat(scale));
            let mut cache = ViewDerivationCache::new();
            cache.refresh(&inp, DirtyFlags::all(), false);
            let d = derived(&cache);
            assert_ne!(d.world_to_vpc, DMat4::IDENTITY, "scale {scale}");
            assert!((d.world_to_vpc * d.vpc_to_world).abs_diff_eq(DMat4::IDENTITY, 1e-9));

            let clip = d.left.clip_from_world(d.world_to_vpc);
            let p = clip.project_point3(d.left.frustum.corners[7]);
            assert!(p.abs_diff_eq(DVec3::ONE, 1e-6), "scale {scale}: {p}");
        }
    }

    #[test]
    fn infinite_view_has_no_translation() {
        let mut inp = inputs();
        inp.vpc_to_world = DMat4::from_translation(DVec3::new(10.0, -3.0, 7.0));
        let mut cache = ViewDerivationCache::new();
        cache.refresh(&inp, DirtyFlags::all(), true);
        let d = derived(&cache);
        let origin = (d.left.infinite_view * d.infinite_world_to_vpc).transform_point3(DVec3::ZERO);
        assert!(origin.abs_diff_eq(DVec3::ZERO, 1e-12));
    }

    #[test]
    fn parallel_projection_ignores_eye_distance() {
        let mut inp = inputs();
        inp.policy.projection = ProjectionPolicy::Parallel;
        let mut cache = ViewDerivationCache::new();
        cache.refresh(&inp, DirtyFlags::all(), false);
        let a = derived(&cache).left.projection;

        inp.policy.field_of_view = 1.2;
        cache.refresh(&inp, DirtyFlags::VIEW_POLICY, false);
        assert!(derived(&cache).left.projection.abs_diff_eq(a, 1e-12));
    }

    #[test]
    fn virtual_world_resize_scales_with_window() {
        let mut inp = inputs();
        inp.policy.window_resize = WindowResizePolicy::VirtualWorld;
        let mut cache = ViewDerivationCache::new();
        cache.refresh(&inp, DirtyFlags::all(), false);
        let small = derived(&cache).vpc_to_coexistence_scale;

        inp.window = PixelRect::new(0, 0, 1920, 1080);
        cache.refresh(&inp, DirtyFlags::CANVAS, false);
        let full = derived(&cache).vpc_to_coexistence_scale;
        assert!((full / small - 1920.0 / 1280.0).abs() < 1e-12);
    }
}
