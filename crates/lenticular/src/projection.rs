//! Off-axis multi-view projection math.
//!
//! Every view looks at the same focal plane. Instead of rotating the camera,
//! each view translates it sideways and shears the frustum back by the same
//! amount, so points on the focal plane land on identical pixels in every
//! view while everything in front of or behind it shows parallax.

use crate::config::CameraFramingConfig;
use glam::{Mat4, Quat, Vec3, Vec4};

/// Total angular spread of the views when the calibration does not say
/// otherwise, in degrees.
pub const DEFAULT_VIEW_CONE_DEG: f32 = 40.0;

/// Near planes closer than this are clamped; a perspective projection needs
/// `near > 0`.
pub const MIN_NEAR_CLIP: f32 = 0.01;

/// A perspective camera. Right-handed, looking down its local -Z axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    /// Vertical field of view in degrees.
    pub fov_deg: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 10.0),
            rotation: Quat::IDENTITY,
            fov_deg: 60.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    /// World-to-camera matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position).inverse()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_deg.to_radians(), self.aspect, self.near, self.far)
    }

    /// The camera's viewing direction in world space.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

/// Distance from the camera to the focal plane at which a vertical field of
/// view of `fov_deg` spans `size` units above and below the center.
///
/// Degenerate angles (0 or 180 degrees and beyond) produce infinities; they
/// are rejected when the configuration is validated, not here.
#[inline]
pub fn adjusted_distance(fov_deg: f32, size: f32) -> f32 {
    size / (fov_deg * 0.5).to_radians().tan()
}

/// Horizontal angle of `view` when `num_views` are spread evenly across
/// `view_cone_deg`. View 0 is the leftmost. A single view sits at 0.
#[inline]
pub fn angle_at_view(view: u32, num_views: u32, view_cone_deg: f32) -> f32 {
    let cone = view_cone_deg.abs();
    if num_views <= 1 {
        return 0.0;
    }
    -cone * 0.5 + view as f32 / (num_views - 1) as f32 * cone
}

/// Camera translation and frustum shear for one view.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewProjectionOffset {
    /// Camera translation along its local X axis.
    pub offset_x: f32,
    /// Camera translation along its local Y axis. Always zero: the panels
    /// only have horizontal parallax.
    pub offset_y: f32,
    /// Shear applied to the projection's X row.
    pub proj_offset_x: f32,
    pub proj_offset_y: f32,
}

impl ViewProjectionOffset {
    /// Packs the offset as `(offset_x, offset_y, proj_offset_x, proj_offset_y)`,
    /// the layout of the `viewOffset[]` shader array.
    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(self.offset_x, self.offset_y, self.proj_offset_x, self.proj_offset_y)
    }

    /// Shifts a base view/projection pair to this view.
    pub fn apply(&self, view: Mat4, proj: Mat4) -> (Mat4, Mat4) {
        let mut view = view;
        let mut proj = proj;
        view.w_axis.x -= self.offset_x;
        view.w_axis.y -= self.offset_y;
        proj.z_axis.x -= self.proj_offset_x;
        proj.z_axis.y -= self.proj_offset_y;
        (view, proj)
    }
}

/// Offsets for `view` of `num_views` using the default 40 degree cone.
pub fn view_projection_offsets(
    aspect: f32,
    fov_deg: f32,
    size: f32,
    view: u32,
    num_views: u32,
) -> ViewProjectionOffset {
    view_projection_offsets_with_cone(aspect, fov_deg, size, view, num_views, DEFAULT_VIEW_CONE_DEG)
}

pub fn view_projection_offsets_with_cone(
    aspect: f32,
    fov_deg: f32,
    size: f32,
    view: u32,
    num_views: u32,
    view_cone_deg: f32,
) -> ViewProjectionOffset {
    let distance = adjusted_distance(fov_deg, size);
    let horizontal = angle_at_view(view, num_views, view_cone_deg);
    let vertical = 0.0f32;

    let offset_x = distance * horizontal.to_radians().tan();
    let offset_y = distance * vertical.to_radians().tan();

    ViewProjectionOffset {
        offset_x,
        offset_y,
        proj_offset_x: offset_x / (size * aspect),
        proj_offset_y: offset_y / size,
    }
}

/// Places `camera` so that `framing.size` fills its field of view at the
/// world origin, and fits the clip planes around that focal plane.
///
/// The offsets computed by [`view_projection_offsets`] are relative to the
/// resulting distance, so this runs once per frame before them.
pub fn setup_camera_framing(camera: &mut Camera, framing: &CameraFramingConfig) {
    let distance = adjusted_distance(framing.fov, framing.size);

    camera.fov_deg = framing.fov;
    camera.near = (distance - framing.near_clip_factor * framing.size).max(MIN_NEAR_CLIP);
    camera.far = (distance + framing.far_clip_factor * framing.size).max(camera.near + MIN_NEAR_CLIP);
    camera.rotation = Quat::IDENTITY;
    camera.position = Vec3::new(0.0, 0.0, distance);
}
