use glam::DVec3;

/// Which eye a non-stereo surface renders from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MonoscopicPolicy {
    /// Midpoint between the left and right eye.
    #[default]
    CyclopeanEye,
    LeftEye,
    RightEye,
}

/// How eye positions in image-plate space are obtained.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum EyepointPolicy {
    /// Centred on the window; distance derived from a constant horizontal field of view.
    #[default]
    FixedFieldOfView,
    /// Manual x/y measured from the window's lower-left corner, manual z.
    RelativeToWindow,
    /// Absolute image-plate position, tracked when a tracker publishes eyes.
    RelativeToScreen,
    /// Manual coexistence position mapped into the image plate.
    RelativeToCoexistence,
}

/// Reference a clip distance is measured from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ClipPolicy {
    /// Physical metres from the eye.
    #[default]
    PhysicalEye,
    /// Physical metres from the screen plane, positive away from the viewer.
    PhysicalScreen,
    /// Virtual-world units from the eye.
    VirtualEye,
    /// Virtual-world units from the screen plane.
    VirtualScreen,
}

impl ClipPolicy {
    #[inline]
    pub fn is_virtual(self) -> bool {
        matches!(self, ClipPolicy::VirtualEye | ClipPolicy::VirtualScreen)
    }

    #[inline]
    pub fn is_screen_relative(self) -> bool {
        matches!(self, ClipPolicy::PhysicalScreen | ClipPolicy::VirtualScreen)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ProjectionPolicy {
    #[default]
    Perspective,
    Parallel,
}

/// How the view-platform → coexistence scale is chosen.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ScreenScalePolicy {
    /// Half the physical screen width, so [-1, 1] in VPC spans the screen.
    #[default]
    ScreenSize,
    /// [`ViewPolicy::screen_scale`] verbatim.
    Explicit,
}

/// What stays fixed when the window is resized.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum WindowResizePolicy {
    /// Physical size of virtual objects stays constant; a bigger window shows more world.
    #[default]
    PhysicalWorld,
    /// The visible virtual world stays constant; objects grow with the window.
    VirtualWorld,
}

/// Abstract view configuration.
///
/// Read-only for the engine: external code publishes a new policy through
/// `Surface::set_view_policy`, which marks the surface dirty.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewPolicy {
    pub monoscopic: MonoscopicPolicy,
    pub eyepoint: EyepointPolicy,
    pub projection: ProjectionPolicy,

    pub front_clip: ClipPolicy,
    pub front_clip_distance: f64,
    pub back_clip: ClipPolicy,
    pub back_clip_distance: f64,

    pub screen_scale_policy: ScreenScalePolicy,
    pub screen_scale: f64,
    pub window_resize: WindowResizePolicy,

    /// Horizontal field of view in radians, for [`EyepointPolicy::FixedFieldOfView`].
    pub field_of_view: f64,
    /// Eye separation in metres, for [`EyepointPolicy::FixedFieldOfView`].
    pub interocular_distance: f64,

    pub stereo_enable: bool,
    /// Request antialiasing; satisfied by multisampling or accumulation.
    pub scene_antialiasing: bool,

    /// Place the coexistence origin at the window centre instead of going through
    /// the tracker-base calibration.
    pub coexistence_centering: bool,

    pub left_manual_eye_in_image_plate: DVec3,
    pub right_manual_eye_in_image_plate: DVec3,
    pub left_manual_eye_in_coexistence: DVec3,
    pub right_manual_eye_in_coexistence: DVec3,
}

impl Default for ViewPolicy {
    fn default() -> Self {
        Self {
            monoscopic: MonoscopicPolicy::default(),
            eyepoint: EyepointPolicy::default(),
            projection: ProjectionPolicy::default(),
            front_clip: ClipPolicy::PhysicalEye,
            front_clip_distance: 0.1,
            back_clip: ClipPolicy::PhysicalEye,
            back_clip_distance: 10.0,
            screen_scale_policy: ScreenScalePolicy::default(),
            screen_scale: 1.0,
            window_resize: WindowResizePolicy::default(),
            field_of_view: std::f64::consts::FRAC_PI_4,
            interocular_distance: 0.066,
            stereo_enable: true,
            scene_antialiasing: false,
            coexistence_centering: true,
            left_manual_eye_in_image_plate: DVec3::new(0.142, 0.135, 0.4572),
            right_manual_eye_in_image_plate: DVec3::new(0.208, 0.135, 0.4572),
            left_manual_eye_in_coexistence: DVec3::new(-0.033, 0.0, 0.4572),
            right_manual_eye_in_coexistence: DVec3::new(0.033, 0.0, 0.4572),
        }
    }
}
