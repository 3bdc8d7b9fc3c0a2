//! Free-flying perspective camera with lazily derived matrices.

use bitflags::bitflags;
use glam::{Mat4, Quat, Vec3, Vec4};

bitflags! {
    /// Derived camera state that is out of date.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CameraDirtyFlags: u8 {
        const VIEW = 1 << 0;
        const PROJECTION = 1 << 1;
        const FRUSTUM = 1 << 2;
        const UPDATE_ID = 1 << 3;
    }
}

impl CameraDirtyFlags {
    const POSE: Self = Self::VIEW.union(Self::FRUSTUM).union(Self::UPDATE_ID);
    const LENS: Self = Self::PROJECTION.union(Self::FRUSTUM).union(Self::UPDATE_ID);
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CameraError {
    #[error("aspect ratio must be greater than zero, got {0}")]
    InvalidAspectRatio(f32),
    #[error("near distance must be greater than zero, got {0}")]
    InvalidNearDistance(f32),
    #[error("far distance must be greater than zero, got {0}")]
    InvalidFarDistance(f32),
    #[error("near distance {near} must be less than far distance {far}")]
    NearNotBeforeFar { near: f32, far: f32 },
    #[error("field of view must be in (0, 180) degrees, got {0}")]
    InvalidFieldOfView(f32),
    #[error("view direction must not be zero")]
    ZeroViewDirection,
    #[error("up direction must not be zero")]
    ZeroUpDirection,
    #[error("view and up directions must not be parallel")]
    ParallelDirections,
}

/// Construction parameters of a [`FreeCamera`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSettings {
    pub position: Vec3,
    pub view_direction: Vec3,
    pub up_direction: Vec3,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            view_direction: Vec3::NEG_Z,
            up_direction: Vec3::Y,
            fov_degrees: 90.0,
            aspect_ratio: 16.0 / 9.0,
            near: 1.0,
            far: 10_000.0,
        }
    }
}

/// The six clip planes of a view-projection matrix. Plane normals point
/// inwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract planes from a view-projection matrix with a `[0, 1]` depth
    /// range.
    pub fn from_view_projection(m: Mat4) -> Self {
        let (r0, r1, r2, r3) = (m.row(0), m.row(1), m.row(2), m.row(3));
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(|p| {
            let len = p.truncate().length();
            if len > 0.0 { p / len } else { p }
        });
        Self { planes }
    }

    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(point) + plane.w >= 0.0)
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(center) + plane.w >= -radius)
    }
}

/// Perspective camera that moves and turns freely.
///
/// View matrix, projection matrix and frustum are recomputed on first
/// access after a change.
#[derive(Debug, Clone)]
pub struct FreeCamera {
    settings: CameraSettings,
    dirty: CameraDirtyFlags,
    view: Mat4,
    projection: Mat4,
    frustum: Frustum,
    update_id: u64,
}

impl FreeCamera {
    /// Default camera for a viewport with the given aspect ratio.
    pub fn new(aspect_ratio: f32) -> Result<Self, CameraError> {
        Self::from_settings(CameraSettings {
            aspect_ratio,
            ..CameraSettings::default()
        })
    }

    pub fn from_settings(settings: CameraSettings) -> Result<Self, CameraError> {
        validate(&settings)?;
        let settings = CameraSettings {
            view_direction: settings.view_direction.normalize(),
            up_direction: settings.up_direction.normalize(),
            ..settings
        };
        Ok(Self {
            settings,
            dirty: CameraDirtyFlags::all(),
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            frustum: Frustum::from_view_projection(Mat4::IDENTITY),
            update_id: 0,
        })
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    pub fn position(&self) -> Vec3 {
        self.settings.position
    }

    pub fn view_direction(&self) -> Vec3 {
        self.settings.view_direction
    }

    pub fn up_direction(&self) -> Vec3 {
        self.settings.up_direction
    }

    pub fn right_direction(&self) -> Vec3 {
        self.settings
            .view_direction
            .cross(self.settings.up_direction)
            .normalize()
    }

    pub fn dirty(&self) -> CameraDirtyFlags {
        self.dirty
    }

    pub fn set_position(&mut self, position: Vec3) {
        if self.settings.position != position {
            self.settings.position = position;
            self.dirty |= CameraDirtyFlags::POSE;
        }
    }

    pub fn set_view_direction(&mut self, direction: Vec3) -> Result<(), CameraError> {
        self.update_pose(|s| s.view_direction = direction)
    }

    pub fn set_up_direction(&mut self, up: Vec3) -> Result<(), CameraError> {
        self.update_pose(|s| s.up_direction = up)
    }

    /// Turn to face `target`.
    pub fn look_at(&mut self, target: Vec3) -> Result<(), CameraError> {
        let direction = target - self.settings.position;
        self.set_view_direction(direction)
    }

    pub fn set_field_of_view(&mut self, fov_degrees: f32) -> Result<(), CameraError> {
        self.update_lens(|s| s.fov_degrees = fov_degrees)
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) -> Result<(), CameraError> {
        self.update_lens(|s| s.aspect_ratio = aspect_ratio)
    }

    pub fn set_clip_distances(&mut self, near: f32, far: f32) -> Result<(), CameraError> {
        self.update_lens(|s| {
            s.near = near;
            s.far = far;
        })
    }

    pub fn translate(&mut self, delta: Vec3) {
        self.set_position(self.settings.position + delta);
    }

    pub fn move_forward(&mut self, distance: f32) {
        self.translate(self.settings.view_direction * distance);
    }

    pub fn move_right(&mut self, distance: f32) {
        self.translate(self.right_direction() * distance);
    }

    pub fn move_up(&mut self, distance: f32) {
        self.translate(self.settings.up_direction * distance);
    }

    /// Turn around the up direction. Positive angles turn left.
    pub fn yaw(&mut self, radians: f32) {
        let rotation = Quat::from_axis_angle(self.settings.up_direction, radians);
        let direction = (rotation * self.settings.view_direction).normalize();
        if direction != self.settings.view_direction {
            self.settings.view_direction = direction;
            self.dirty |= CameraDirtyFlags::POSE;
        }
    }

    /// Tilt around the right direction. Positive angles look up. Rotations
    /// that would align the view with the up direction are rejected.
    pub fn pitch(&mut self, radians: f32) -> Result<(), CameraError> {
        let rotation = Quat::from_axis_angle(self.right_direction(), radians);
        self.set_view_direction(rotation * self.settings.view_direction)
    }

    pub fn view_matrix(&mut self) -> Mat4 {
        if self.dirty.contains(CameraDirtyFlags::VIEW) {
            let s = &self.settings;
            self.view = Mat4::look_to_rh(s.position, s.view_direction, s.up_direction);
            self.dirty.remove(CameraDirtyFlags::VIEW);
        }
        self.view
    }

    pub fn projection_matrix(&mut self) -> Mat4 {
        if self.dirty.contains(CameraDirtyFlags::PROJECTION) {
            let s = &self.settings;
            self.projection =
                Mat4::perspective_rh(s.fov_degrees.to_radians(), s.aspect_ratio, s.near, s.far);
            self.dirty.remove(CameraDirtyFlags::PROJECTION);
        }
        self.projection
    }

    pub fn frustum(&mut self) -> Frustum {
        if self.dirty.contains(CameraDirtyFlags::FRUSTUM) {
            let view_projection = self.projection_matrix() * self.view_matrix();
            self.frustum = Frustum::from_view_projection(view_projection);
            self.dirty.remove(CameraDirtyFlags::FRUSTUM);
        }
        self.frustum
    }

    /// Advances once per batch of changes, on the first read after them.
    pub fn update_id(&mut self) -> u64 {
        if self.dirty.contains(CameraDirtyFlags::UPDATE_ID) {
            self.update_id += 1;
            self.dirty.remove(CameraDirtyFlags::UPDATE_ID);
        }
        self.update_id
    }

    fn update_pose(&mut self, change: impl FnOnce(&mut CameraSettings)) -> Result<(), CameraError> {
        self.update(change, CameraDirtyFlags::POSE)
    }

    fn update_lens(&mut self, change: impl FnOnce(&mut CameraSettings)) -> Result<(), CameraError> {
        self.update(change, CameraDirtyFlags::LENS)
    }

    fn update(
        &mut self,
        change: impl FnOnce(&mut CameraSettings),
        flags: CameraDirtyFlags,
    ) -> Result<(), CameraError> {
        let mut next = self.settings;
        change(&mut next);
        validate(&next)?;
        next.view_direction = next.view_direction.normalize();
        next.up_direction = next.up_direction.normalize();
        if next != self.settings {
            self.settings = next;
            self.dirty |= flags;
        }
        Ok(())
    }
}

fn validate(s: &CameraSettings) -> Result<(), CameraError> {
    if !(s.aspect_ratio > 0.0) {
        return Err(CameraError::InvalidAspectRatio(s.aspect_ratio));
    }
    if !(s.far > 0.0) {
        return Err(CameraError::InvalidFarDistance(s.far));
    }
    if !(s.near > 0.0) {
        return Err(CameraError::InvalidNearDistance(s.near));
    }
    if s.near >= s.far {
        return Err(CameraError::NearNotBeforeFar {
            near: s.near,
            far: s.far,
        });
    }
    if !(s.fov_degrees > 0.0 && s.fov_degrees < 180.0) {
        return Err(CameraError::InvalidFieldOfView(s.fov_degrees));
    }
    if s.view_direction.length_squared() <= f32::EPSILON {
        return Err(CameraError::ZeroViewDirection);
    }
    if s.up_direction.length_squared() <= f32::EPSILON {
        return Err(CameraError::ZeroUpDirection);
    }
    if s
        .view_direction
        .normalize()
        .cross(s.up_direction.normalize())
        .length_squared()
        <= 1e-6
    {
        return Err(CameraError::ParallelDirections);
    }
    Ok(())
}
