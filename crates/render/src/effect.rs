//! Raycast effect state.
//!
//! Caches the matrices the raycasting program needs and pushes them to the
//! backend only when their inputs changed. The frame loop sets all inputs
//! every frame; equal values leave the cache untouched.
//!
//! # Invariants
//! - A derived value is recomputed only while its dirty bit is set.
//! - Setting the world matrix stales only the world-view-projection matrix.
//! - Setting the view or projection matrix stales both derived matrices.
//! - Changing the mode re-selects the technique and never stales a matrix.
//! - A failed mode change leaves mode and active technique unchanged.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use glam::{Mat4, Vec3};
use volterra_field::DensityField;

use crate::backend::{BackendError, EffectHandle, GraphicsBackend, TextureHandle, UniformValue};
use crate::quad::{FullScreenQuad, GpuMesh};
use crate::shader::{ShaderCatalog, ShaderContext, ShaderError};
use crate::shaders::VOLUME_RAYCASTING_EFFECT;

pub const WORLD_VIEW_PROJECTION_MATRIX: &str = "WorldViewProjectionMatrix";
pub const INVERSE_VIEW_PROJECTION_MATRIX: &str = "InverseViewProjectionMatrix";
pub const CAMERA_POSITION_WORLD_SPACE: &str = "CameraPositionWorldSpace";
pub const VOLUME_DIMENSION: &str = "VolumeDimension";

/// Every parameter the raycasting program declares.
pub const PARAMETER_NAMES: [&str; 4] = [
    WORLD_VIEW_PROJECTION_MATRIX,
    INVERSE_VIEW_PROJECTION_MATRIX,
    CAMERA_POSITION_WORLD_SPACE,
    VOLUME_DIMENSION,
];

bitflags! {
    /// Derived values that must be recomputed and pushed before the next draw.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DirtyFlags: u8 {
        const WORLD_VIEW_PROJECTION = 1 << 0;
        const INVERSE_VIEW_PROJECTION = 1 << 1;
        const CAMERA_POSITION = 1 << 2;
    }
}

/// Rendering modes. Each maps to the technique of the same name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EffectMode {
    #[default]
    ColorFromScreenSpacePosition,
    ColorFromCameraRayDirection,
    FullVolumeRaycasting,
    VertexColor,
}

impl EffectMode {
    pub const ALL: [EffectMode; 4] = [
        EffectMode::ColorFromScreenSpacePosition,
        EffectMode::ColorFromCameraRayDirection,
        EffectMode::FullVolumeRaycasting,
        EffectMode::VertexColor,
    ];

    pub fn technique_name(&self) -> &'static str {
        match self {
            Self::ColorFromScreenSpacePosition => "ColorFromScreenSpacePosition",
            Self::ColorFromCameraRayDirection => "ColorFromCameraRayDirection",
            Self::FullVolumeRaycasting => "FullVolumeRaycasting",
            Self::VertexColor => "VertexColor",
        }
    }
}

impl fmt::Display for EffectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.technique_name())
    }
}

impl FromStr for EffectMode {
    type Err = EffectError;

    /// Accepts the technique name in any case, with optional `_`, `-` or
    /// space separators (`full_volume_raycasting`, `vertex-color`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Self::ALL
            .into_iter()
            .find(|mode| mode.technique_name().to_ascii_lowercase() == normalized)
            .ok_or_else(|| EffectError::InvalidMode(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EffectError {
    #[error("unknown rendering mode \"{0}\"")]
    InvalidMode(String),
    #[error("the loaded effect has no technique for mode {mode}")]
    TechniqueNotFound { mode: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Shader(#[from] ShaderError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RecomputeCounts {
    world_view_projection: u64,
    inverse_view_projection: u64,
    camera_position: u64,
}

/// Shader-parameter cache and technique selector of the raycasting program.
///
/// Owns its backend; the compiled program is released on drop.
pub struct RaycastEffect<B: GraphicsBackend> {
    backend: B,
    program: EffectHandle,
    world: Mat4,
    view: Mat4,
    projection: Mat4,
    world_view_projection: Mat4,
    inverse_view_projection: Mat4,
    camera_position: Vec3,
    mode: EffectMode,
    dirty: DirtyFlags,
    recomputes: RecomputeCounts,
    quad: FullScreenQuad,
    volume: Option<TextureHandle>,
}

impl<B: GraphicsBackend> RaycastEffect<B> {
    /// Compile the raycasting program in the context's language and select
    /// the default mode. Every derived value starts stale.
    pub fn new(
        mut backend: B,
        context: &ShaderContext,
        catalog: &ShaderCatalog,
    ) -> Result<Self, EffectError> {
        let source = catalog.source(VOLUME_RAYCASTING_EFFECT, context.language())?;
        let program = backend.compile_effect(context.language(), VOLUME_RAYCASTING_EFFECT, source)?;

        let mut effect = Self {
            backend,
            program,
            world: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            world_view_projection: Mat4::IDENTITY,
            inverse_view_projection: Mat4::IDENTITY,
            camera_position: Vec3::ZERO,
            mode: EffectMode::default(),
            dirty: DirtyFlags::all(),
            recomputes: RecomputeCounts::default(),
            quad: FullScreenQuad::new(),
            volume: None,
        };
        effect.select_technique(effect.mode)?;
        tracing::info!(language = %context.language(), mode = %effect.mode, "raycast effect created");
        Ok(effect)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn program(&self) -> EffectHandle {
        self.program
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.world
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn camera_position(&self) -> Vec3 {
        self.camera_position
    }

    pub fn mode(&self) -> EffectMode {
        self.mode
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn volume(&self) -> Option<TextureHandle> {
        self.volume
    }

    pub fn is_quad_built(&self) -> bool {
        self.quad.is_built()
    }

    pub fn set_world_matrix(&mut self, world: Mat4) {
        if self.world != world {
            self.world = world;
            self.dirty.insert(DirtyFlags::WORLD_VIEW_PROJECTION);
        }
    }

    pub fn set_view_matrix(&mut self, view: Mat4) {
        if self.view != view {
            self.view = view;
            self.dirty
                .insert(DirtyFlags::WORLD_VIEW_PROJECTION | DirtyFlags::INVERSE_VIEW_PROJECTION);
        }
    }

    pub fn set_projection_matrix(&mut self, projection: Mat4) {
        if self.projection != projection {
            self.projection = projection;
            self.dirty
                .insert(DirtyFlags::WORLD_VIEW_PROJECTION | DirtyFlags::INVERSE_VIEW_PROJECTION);
        }
    }

    pub fn set_camera_position(&mut self, position: Vec3) {
        if self.camera_position != position {
            self.camera_position = position;
            self.dirty.insert(DirtyFlags::CAMERA_POSITION);
        }
    }

    /// World, then view, then projection. Recomputed and pushed only when
    /// stale; the dirty bit is cleared after a successful push.
    pub fn world_view_projection(&mut self) -> Result<Mat4, EffectError> {
        if self.dirty.contains(DirtyFlags::WORLD_VIEW_PROJECTION) {
            let wvp = self.projection * self.view * self.world;
            self.backend
                .set_uniform(WORLD_VIEW_PROJECTION_MATRIX, UniformValue::Mat4(wvp))?;
            self.world_view_projection = wvp;
            self.dirty.remove(DirtyFlags::WORLD_VIEW_PROJECTION);
            self.recomputes.world_view_projection += 1;
            tracing::debug!("world view projection recomputed");
        }
        Ok(self.world_view_projection)
    }

    /// Inverse of view followed by projection.
    pub fn inverse_view_projection(&mut self) -> Result<Mat4, EffectError> {
        if self.dirty.contains(DirtyFlags::INVERSE_VIEW_PROJECTION) {
            let inverse = (self.projection * self.view).inverse();
            self.backend
                .set_uniform(INVERSE_VIEW_PROJECTION_MATRIX, UniformValue::Mat4(inverse))?;
            self.inverse_view_projection = inverse;
            self.dirty.remove(DirtyFlags::INVERSE_VIEW_PROJECTION);
            self.recomputes.inverse_view_projection += 1;
            tracing::debug!("inverse view projection recomputed");
        }
        Ok(self.inverse_view_projection)
    }

    /// Push every stale parameter. Called before each draw.
    pub fn apply(&mut self) -> Result<(), EffectError> {
        self.world_view_projection()?;
        self.inverse_view_projection()?;
        if self.dirty.contains(DirtyFlags::CAMERA_POSITION) {
            self.backend.set_uniform(
                CAMERA_POSITION_WORLD_SPACE,
                UniformValue::Vec3(self.camera_position),
            )?;
            self.dirty.remove(DirtyFlags::CAMERA_POSITION);
            self.recomputes.camera_position += 1;
            tracing::debug!(position = ?self.camera_position, "camera position pushed");
        }
        Ok(())
    }

    /// How often the values named by `flags` were recomputed and pushed.
    pub fn recompute_count(&self, flags: DirtyFlags) -> u64 {
        let mut total = 0;
        if flags.contains(DirtyFlags::WORLD_VIEW_PROJECTION) {
            total += self.recomputes.world_view_projection;
        }
        if flags.contains(DirtyFlags::INVERSE_VIEW_PROJECTION) {
            total += self.recomputes.inverse_view_projection;
        }
        if flags.contains(DirtyFlags::CAMERA_POSITION) {
            total += self.recomputes.camera_position;
        }
        total
    }

    /// Switch to the technique of `mode`. Selecting the current mode is a
    /// no-op.
    pub fn set_mode(&mut self, mode: EffectMode) -> Result<(), EffectError> {
        if mode == self.mode {
            return Ok(());
        }
        self.select_technique(mode)?;
        tracing::info!(from = %self.mode, to = %mode, "effect mode changed");
        self.mode = mode;
        Ok(())
    }

    pub fn set_mode_by_name(&mut self, name: &str) -> Result<(), EffectError> {
        let mode: EffectMode = name.parse()?;
        self.set_mode(mode)
    }

    fn select_technique(&mut self, mode: EffectMode) -> Result<(), EffectError> {
        match self.backend.select_technique(mode.technique_name()) {
            Ok(()) => Ok(()),
            Err(BackendError::TechniqueNotFound(_)) => {
                tracing::warn!(%mode, current = %self.mode, "technique not found in effect");
                Err(EffectError::TechniqueNotFound {
                    mode: mode.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Upload `field` as the density volume and push its extents. A
    /// previously uploaded volume is released once the new one is bound.
    pub fn set_density_field(&mut self, field: &DensityField) -> Result<TextureHandle, EffectError> {
        let dimension = field.dimension();
        let texture =
            self.backend
                .create_volume_texture("density_field", dimension, field.scalar_values())?;
        if let Some(previous) = self.volume.replace(texture) {
            self.backend.release_volume_texture(previous);
        }
        let extents = Vec3::new(dimension.x as f32, dimension.y as f32, dimension.z as f32);
        self.backend
            .set_uniform(VOLUME_DIMENSION, UniformValue::Vec3(extents))?;
        tracing::info!(%dimension, "density field uploaded");
        Ok(texture)
    }

    /// Draw the full-screen quad with the current technique, building it on
    /// first use.
    pub fn draw_full_screen_quad(&mut self) -> Result<(), EffectError> {
        let _span = tracing::info_span!("draw_full_screen_quad", mode = %self.mode).entered();
        let mesh = self.quad.ensure_built(&mut self.backend)?;
        self.draw_mesh(&mesh)
    }

    /// Apply the effect and draw `mesh` as an indexed triangle list.
    pub fn draw_mesh(&mut self, mesh: &GpuMesh) -> Result<(), EffectError> {
        self.apply()?;
        self.backend
            .draw_indexed(mesh.vertices, mesh.indices, mesh.primitive_count)?;
        Ok(())
    }
}

impl<B: GraphicsBackend> Drop for RaycastEffect<B> {
    fn drop(&mut self) {
        if let Some(volume) = self.volume.take() {
            self.backend.release_volume_texture(volume);
        }
        self.backend.release_effect(self.program);
    }
}

impl<B: GraphicsBackend> fmt::Debug for RaycastEffect<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaycastEffect")
            .field("program", &self.program)
            .field("mode", &self.mode)
            .field("dirty", &self.dirty)
            .field("volume", &self.volume)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessBackend;
    use crate::shader::ShaderLanguage;
    use crate::backend::Vertex;

    fn effect() -> RaycastEffect<HeadlessBackend> {
        RaycastEffect::new(
            HeadlessBackend::new(),
            &ShaderContext::with_language(ShaderLanguage::Wgsl),
            &ShaderCatalog::builtin(),
        )
        .unwrap()
    }

    fn uploads(effect: &RaycastEffect<HeadlessBackend>, name: &str) -> u64 {
        effect.backend().stats().uniform_uploads_of(name)
    }

    #[test]
    fn starts_stale_in_default_mode() {
        let fx = effect();
        assert_eq!(fx.dirty(), DirtyFlags::all());
        assert_eq!(fx.mode(), EffectMode::ColorFromScreenSpacePosition);
        assert_eq!(
            fx.backend().active_technique(),
            Some("ColorFromScreenSpacePosition")
        );
    }

    #[test]
    fn identity_inputs_give_identity() {
        let mut fx = effect();
        assert_eq!(fx.world_view_projection().unwrap(), Mat4::IDENTITY);
        assert_eq!(fx.inverse_view_projection().unwrap(), Mat4::IDENTITY);
    }

    #[test]
    fn world_applies_before_view_before_projection() {
        let mut fx = effect();
        let world = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let view = Mat4::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let projection = Mat4::from_scale(Vec3::new(2.0, 2.0, 2.0));
        fx.set_world_matrix(world);
        fx.set_view_matrix(view);
        fx.set_projection_matrix(projection);

        let wvp = fx.world_view_projection().unwrap();
        assert!(wvp.abs_diff_eq(projection * view * world, 1e-6));

        // Origin: translated to (1,0,0), rotated to (0,1,0), scaled to (0,2,0).
        let p = wvp.transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));
    }

    #[test]
    fn inverse_undoes_view_projection() {
        let mut fx = effect();
        let view = Mat4::look_at_rh(Vec3::new(3.0, 4.0, 5.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(1.2, 16.0 / 9.0, 0.5, 500.0);
        fx.set_view_matrix(view);
        fx.set_projection_matrix(projection);
        let inverse = fx.inverse_view_projection().unwrap();
        assert!((inverse * projection * view).abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn two_reads_recompute_once() {
        let mut fx = effect();
        fx.set_world_matrix(Mat4::from_scale(Vec3::splat(3.0)));
        let first = fx.world_view_projection().unwrap();
        let second = fx.world_view_projection().unwrap();
        assert_eq!(first, second);
        assert_eq!(fx.recompute_count(DirtyFlags::WORLD_VIEW_PROJECTION), 1);
        assert_eq!(uploads(&fx, WORLD_VIEW_PROJECTION_MATRIX), 1);
    }

    #[test]
    fn world_change_keeps_inverse_fresh() {
        let mut fx = effect();
        fx.apply().unwrap();
        assert!(fx.dirty().is_empty());

        fx.set_world_matrix(Mat4::from_translation(Vec3::Z));
        assert_eq!(fx.dirty(), DirtyFlags::WORLD_VIEW_PROJECTION);
    }

    #[test]
    fn view_and_projection_stale_both_matrices() {
        let both = DirtyFlags::WORLD_VIEW_PROJECTION | DirtyFlags::INVERSE_VIEW_PROJECTION;
        let mut fx = effect();
        fx.apply().unwrap();
        fx.set_view_matrix(Mat4::from_translation(Vec3::X));
        assert_eq!(fx.dirty(), both);

        fx.apply().unwrap();
        fx.set_projection_matrix(Mat4::from_scale(Vec3::splat(0.5)));
        assert_eq!(fx.dirty(), both);
    }

    #[test]
    fn equal_inputs_change_nothing() {
        let mut fx = effect();
        fx.apply().unwrap();
        fx.set_world_matrix(Mat4::IDENTITY);
        fx.set_view_matrix(Mat4::IDENTITY);
        fx.set_projection_matrix(Mat4::IDENTITY);
        fx.set_camera_position(Vec3::ZERO);
        assert!(fx.dirty().is_empty());

        fx.apply().unwrap();
        assert_eq!(uploads(&fx, WORLD_VIEW_PROJECTION_MATRIX), 1);
        assert_eq!(uploads(&fx, INVERSE_VIEW_PROJECTION_MATRIX), 1);
        assert_eq!(uploads(&fx, CAMERA_POSITION_WORLD_SPACE), 1);
    }

    #[test]
    fn camera_position_pushed_on_apply() {
        let mut fx = effect();
        fx.apply().unwrap();
        fx.set_camera_position(Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(fx.dirty(), DirtyFlags::CAMERA_POSITION);
        fx.apply().unwrap();
        assert_eq!(
            fx.backend().uniform(CAMERA_POSITION_WORLD_SPACE),
            Some(UniformValue::Vec3(Vec3::new(0.0, 10.0, 0.0)))
        );
        assert_eq!(fx.recompute_count(DirtyFlags::CAMERA_POSITION), 2);
    }

    #[test]
    fn mode_change_selects_technique_without_staling() {
        let mut fx = effect();
        fx.apply().unwrap();
        fx.set_mode(EffectMode::FullVolumeRaycasting).unwrap();
        assert_eq!(fx.mode(), EffectMode::FullVolumeRaycasting);
        assert_eq!(fx.backend().active_technique(), Some("FullVolumeRaycasting"));
        assert!(fx.dirty().is_empty());
    }

    #[test]
    fn missing_technique_leaves_mode_unchanged() {
        let mut catalog = ShaderCatalog::builtin();
        catalog.insert(
            VOLUME_RAYCASTING_EFFECT,
            ShaderLanguage::Wgsl,
            b"@fragment
fn fs_ColorFromScreenSpacePosition() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
}
"
            .to_vec(),
        );
        let mut fx = RaycastEffect::new(
            HeadlessBackend::new(),
            &ShaderContext::with_language(ShaderLanguage::Wgsl),
            &catalog,
        )
        .unwrap();

        let err = fx.set_mode(EffectMode::VertexColor).unwrap_err();
        assert_eq!(
            err,
            EffectError::TechniqueNotFound {
                mode: "VertexColor".into()
            }
        );
        assert_eq!(fx.mode(), EffectMode::ColorFromScreenSpacePosition);
        assert_eq!(
            fx.backend().active_technique(),
            Some("ColorFromScreenSpacePosition")
        );
    }

    #[test]
    fn mode_names_parse_loosely() {
        assert_eq!(
            "full_volume_raycasting".parse::<EffectMode>().unwrap(),
            EffectMode::FullVolumeRaycasting
        );
        assert_eq!("vertex-color".parse::<EffectMode>().unwrap(), EffectMode::VertexColor);
        assert_eq!(
            "ColorFromCameraRayDirection".parse::<EffectMode>().unwrap(),
            EffectMode::ColorFromCameraRayDirection
        );
        for mode in EffectMode::ALL {
            assert_eq!(mode.to_string().parse::<EffectMode>().unwrap(), mode);
        }
    }

    #[test]
    fn unknown_mode_name_rejected() {
        let mut fx = effect();
        let err = fx.set_mode_by_name("Wireframe").unwrap_err();
        assert_eq!(err, EffectError::InvalidMode("Wireframe".into()));
        assert_eq!(fx.mode(), EffectMode::ColorFromScreenSpacePosition);
    }

    #[test]
    fn missing_program_reported() {
        let err = RaycastEffect::new(
            HeadlessBackend::new().with_languages(&[ShaderLanguage::Glsl]),
            &ShaderContext::with_language(ShaderLanguage::Glsl),
            &ShaderCatalog::builtin(),
        )
        .unwrap_err();
        assert!(matches!(err, EffectError::Shader(ShaderError::ResourceNotFound { .. })));
    }

    #[test]
    fn quad_built_once_across_draws() {
        let mut fx = effect();
        assert!(!fx.is_quad_built());
        fx.backend_mut().begin_frame();
        fx.draw_full_screen_quad().unwrap();
        fx.draw_full_screen_quad().unwrap();

        let stats = fx.backend().stats();
        assert_eq!(stats.vertex_buffer_uploads, 1);
        assert_eq!(stats.index_buffer_uploads, 1);
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(fx.backend().metrics().primitive_count, 4);
        assert_eq!(uploads(&fx, WORLD_VIEW_PROJECTION_MATRIX), 1);
    }

    #[test]
    fn draw_mesh_uses_current_technique() {
        let mut fx = effect();
        fx.set_mode(EffectMode::VertexColor).unwrap();
        let verts = [Vertex::new([0.0; 3], [1.0, 0.0, 0.0, 1.0]); 3];
        let mesh = GpuMesh::upload(fx.backend_mut(), "triangle", &verts, &[0, 1, 2]).unwrap();
        fx.draw_mesh(&mesh).unwrap();
        assert_eq!(fx.backend().draws()[0].technique, "VertexColor");
        assert_eq!(fx.backend().draws()[0].primitive_count, 1);
    }

    #[test]
    fn density_field_upload_pushes_dimension() {
        let mut fx = effect();
        let field = DensityField::solid_sphere(4).unwrap();
        let texture = fx.set_density_field(&field).unwrap();
        assert_eq!(fx.volume(), Some(texture));
        assert_eq!(fx.backend().stats().volume_uploads, 1);
        assert_eq!(
            fx.backend().uniform(VOLUME_DIMENSION),
            Some(UniformValue::Vec3(Vec3::splat(4.0)))
        );
    }

    #[test]
    fn replacing_density_field_releases_previous_volume() {
        let mut fx = effect();
        let mut last = None;
        for d in 2..7 {
            let field = DensityField::solid_sphere(d).unwrap();
            last = Some(fx.set_density_field(&field).unwrap());
        }
        assert_eq!(fx.backend().stats().volume_uploads, 5);
        assert_eq!(fx.backend().live_volume_count(), 1);
        assert_eq!(fx.backend().bound_volume(), last);
        assert_eq!(
            fx.backend().uniform(VOLUME_DIMENSION),
            Some(UniformValue::Vec3(Vec3::splat(6.0)))
        );
    }
}
