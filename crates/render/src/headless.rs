//! In-memory graphics backend.
//!
//! Records every upload, parameter push, technique selection and draw call
//! instead of talking to a GPU. Used by the CLI frame loop and by tests that
//! need to observe what the effect sends to the backend.

use std::collections::BTreeMap;
use volterra_common::GridDimension;

use crate::backend::{
    BackendError, BufferHandle, DrawMetrics, EffectHandle, GraphicsBackend, TextureHandle,
    UniformValue, Vertex,
};
use crate::effect::PARAMETER_NAMES;
use crate::shader::{ProgramEntryPoints, ShaderLanguage};

/// Largest volume extent the headless backend accepts per axis, matching
/// common GPU limits for 3D textures.
pub const MAX_VOLUME_EXTENT: u32 = 2048;

/// Running totals of everything the backend was asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub effect_compiles: u64,
    pub vertex_buffer_uploads: u64,
    pub index_buffer_uploads: u64,
    pub volume_uploads: u64,
    pub technique_changes: u64,
    pub draw_calls: u64,
    /// Pushes per parameter name.
    pub uniform_uploads: BTreeMap<String, u64>,
}

impl HeadlessStats {
    pub fn uniform_uploads_of(&self, name: &str) -> u64 {
        self.uniform_uploads.get(name).copied().unwrap_or(0)
    }

    pub fn total_uniform_uploads(&self) -> u64 {
        self.uniform_uploads.values().sum()
    }
}

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub technique: String,
    pub vertices: BufferHandle,
    pub indices: BufferHandle,
    pub primitive_count: u32,
}

#[derive(Debug, Clone)]
enum BufferData {
    Vertices(Vec<Vertex>),
    Indices(Vec<u32>),
}

#[derive(Debug, Clone)]
struct Program {
    techniques: Vec<String>,
}

/// Graphics backend that keeps all state in memory.
#[derive(Debug, Clone)]
pub struct HeadlessBackend {
    languages: Vec<ShaderLanguage>,
    parameters: Vec<String>,
    next_handle: u32,
    programs: BTreeMap<EffectHandle, Program>,
    active_effect: Option<EffectHandle>,
    active_technique: Option<String>,
    uniforms: BTreeMap<String, UniformValue>,
    buffers: BTreeMap<BufferHandle, BufferData>,
    volumes: BTreeMap<TextureHandle, GridDimension>,
    bound_volume: Option<TextureHandle>,
    frame: DrawMetrics,
    draws: Vec<DrawCall>,
    stats: HeadlessStats,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// A backend accepting WGSL programs with the raycasting parameters.
    pub fn new() -> Self {
        Self {
            languages: vec![ShaderLanguage::Wgsl],
            parameters: PARAMETER_NAMES.iter().map(|s| s.to_string()).collect(),
            next_handle: 1,
            programs: BTreeMap::new(),
            active_effect: None,
            active_technique: None,
            uniforms: BTreeMap::new(),
            buffers: BTreeMap::new(),
            volumes: BTreeMap::new(),
            bound_volume: None,
            frame: DrawMetrics::default(),
            draws: Vec::new(),
            stats: HeadlessStats::default(),
        }
    }

    /// Restrict the accepted shader languages.
    pub fn with_languages(mut self, languages: &[ShaderLanguage]) -> Self {
        self.languages = languages.to_vec();
        self
    }

    pub fn stats(&self) -> &HeadlessStats {
        &self.stats
    }

    pub fn active_effect(&self) -> Option<EffectHandle> {
        self.active_effect
    }

    pub fn active_technique(&self) -> Option<&str> {
        self.active_technique.as_deref()
    }

    /// Last value pushed to a parameter.
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }

    /// Every draw call since creation (or the last `clear_draws`).
    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn clear_draws(&mut self) {
        self.draws.clear();
    }

    pub fn bound_volume(&self) -> Option<TextureHandle> {
        self.bound_volume
    }

    /// Number of volume textures not yet released.
    pub fn live_volume_count(&self) -> usize {
        self.volumes.len()
    }

    pub fn vertex_data(&self, handle: BufferHandle) -> Option<&[Vertex]> {
        match self.buffers.get(&handle) {
            Some(BufferData::Vertices(v)) => Some(v),
            _ => None,
        }
    }

    pub fn index_data(&self, handle: BufferHandle) -> Option<&[u32]> {
        match self.buffers.get(&handle) {
            Some(BufferData::Indices(i)) => Some(i),
            _ => None,
        }
    }

    fn allocate_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn compile_effect(
        &mut self,
        language: ShaderLanguage,
        name: &str,
        source: &[u8],
    ) -> Result<EffectHandle, BackendError> {
        if !self.languages.contains(&language) {
            return Err(BackendError::UnsupportedLanguage(language));
        }
        let compile_error = |message: String| BackendError::Compile {
            name: name.to_string(),
            message,
        };
        let text = std::str::from_utf8(source).map_err(|e| compile_error(e.to_string()))?;
        // GLSL programs are accepted as opaque blobs without techniques.
        let techniques = match language {
            ShaderLanguage::Wgsl => ProgramEntryPoints::parse_wgsl(text)
                .map_err(|e| compile_error(e.to_string()))?
                .techniques(),
            ShaderLanguage::Glsl => Vec::new(),
        };

        let handle = EffectHandle(self.allocate_handle());
        self.programs.insert(handle, Program { techniques });
        self.active_effect = Some(handle);
        self.active_technique = None;
        self.stats.effect_compiles += 1;
        Ok(handle)
    }

    fn release_effect(&mut self, effect: EffectHandle) {
        self.programs.remove(&effect);
        if self.active_effect == Some(effect) {
            self.active_effect = None;
            self.active_technique = None;
        }
    }

    fn techniques(&self) -> Vec<String> {
        self.active_effect
            .and_then(|h| self.programs.get(&h))
            .map(|p| p.techniques.clone())
            .unwrap_or_default()
    }

    fn select_technique(&mut self, name: &str) -> Result<(), BackendError> {
        let program = self
            .active_effect
            .and_then(|h| self.programs.get(&h))
            .ok_or(BackendError::NoActiveEffect)?;
        if !program.techniques.iter().any(|t| t == name) {
            return Err(BackendError::TechniqueNotFound(name.to_string()));
        }
        self.active_technique = Some(name.to_string());
        self.stats.technique_changes += 1;
        Ok(())
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), BackendError> {
        if self.active_effect.is_none() {
            return Err(BackendError::NoActiveEffect);
        }
        if !self.parameters.iter().any(|p| p == name) {
            return Err(BackendError::UnknownParameter(name.to_string()));
        }
        self.uniforms.insert(name.to_string(), value);
        *self
            .stats
            .uniform_uploads
            .entry(name.to_string())
            .or_default() += 1;
        Ok(())
    }

    fn create_vertex_buffer(
        &mut self,
        _label: &str,
        vertices: &[Vertex],
    ) -> Result<BufferHandle, BackendError> {
        let handle = BufferHandle(self.allocate_handle());
        self.buffers
            .insert(handle, BufferData::Vertices(vertices.to_vec()));
        self.stats.vertex_buffer_uploads += 1;
        Ok(handle)
    }

    fn create_index_buffer(
        &mut self,
        _label: &str,
        indices: &[u32],
    ) -> Result<BufferHandle, BackendError> {
        let handle = BufferHandle(self.allocate_handle());
        self.buffers
            .insert(handle, BufferData::Indices(indices.to_vec()));
        self.stats.index_buffer_uploads += 1;
        Ok(handle)
    }

    fn create_volume_texture(
        &mut self,
        _label: &str,
        dimension: GridDimension,
        samples: &[f32],
    ) -> Result<TextureHandle, BackendError> {
        if dimension.as_array().iter().any(|&e| e > MAX_VOLUME_EXTENT) {
            return Err(BackendError::VolumeTooLarge {
                dimension,
                max: MAX_VOLUME_EXTENT,
            });
        }
        if samples.len() != dimension.sample_count() {
            return Err(BackendError::SampleCountMismatch {
                dimension,
                expected: dimension.sample_count(),
                actual: samples.len(),
            });
        }
        let handle = TextureHandle(self.allocate_handle());
        self.volumes.insert(handle, dimension);
        self.bound_volume = Some(handle);
        self.stats.volume_uploads += 1;
        Ok(handle)
    }

    fn release_volume_texture(&mut self, texture: TextureHandle) {
        self.volumes.remove(&texture);
        if self.bound_volume == Some(texture) {
            self.bound_volume = None;
        }
    }

    fn draw_indexed(
        &mut self,
        vertices: BufferHandle,
        indices: BufferHandle,
        primitive_count: u32,
    ) -> Result<(), BackendError> {
        if self.vertex_data(vertices).is_none() {
            return Err(BackendError::InvalidBuffer(vertices));
        }
        let index_count = self
            .index_data(indices)
            .ok_or(BackendError::InvalidBuffer(indices))?
            .len();
        if (primitive_count as usize) * 3 > index_count {
            return Err(BackendError::InvalidBuffer(indices));
        }
        let technique = self
            .active_technique
            .clone()
            .ok_or(BackendError::NoActiveEffect)?;

        self.draws.push(DrawCall {
            technique,
            vertices,
            indices,
            primitive_count,
        });
        self.frame.draw_count += 1;
        self.frame.primitive_count += primitive_count as u64;
        self.stats.draw_calls += 1;
        Ok(())
    }

    fn begin_frame(&mut self) {
        self.frame = DrawMetrics::default();
    }

    fn metrics(&self) -> DrawMetrics {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &[u8] = b"
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 1.0);
}

@fragment
fn fs_Red() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.0, 0.0, 1.0);
}

@fragment
fn fs_Green() -> @location(0) vec4<f32> {
    return vec4<f32>(0.0, 1.0, 0.0, 1.0);
}
";

    fn backend_with_program() -> HeadlessBackend {
        let mut backend = HeadlessBackend::new();
        backend
            .compile_effect(ShaderLanguage::Wgsl, "Test", PROGRAM)
            .unwrap();
        backend
    }

    #[test]
    fn compile_discovers_techniques() {
        let backend = backend_with_program();
        assert_eq!(backend.techniques(), vec!["Red", "Green"]);
        assert!(backend.active_effect().is_some());
    }

    #[test]
    fn helper_with_technique_prefix_is_not_selectable() {
        let mut backend = HeadlessBackend::new();
        let program = b"
// fn fs_Legacy() was removed
fn fs_tint(c: vec3<f32>) -> vec4<f32> {
    return vec4<f32>(c, 1.0);
}

@fragment
fn fs_Real() -> @location(0) vec4<f32> {
    return fs_tint(vec3<f32>(1.0, 1.0, 1.0));
}
";
        backend
            .compile_effect(ShaderLanguage::Wgsl, "Test", program)
            .unwrap();
        assert_eq!(backend.techniques(), vec!["Real"]);
        assert_eq!(
            backend.select_technique("tint").unwrap_err(),
            BackendError::TechniqueNotFound("tint".into())
        );
        assert!(backend.select_technique("Legacy").is_err());
    }

    #[test]
    fn malformed_program_fails_to_compile() {
        let mut backend = HeadlessBackend::new();
        let err = backend
            .compile_effect(ShaderLanguage::Wgsl, "Broken", b"@fragment fn fs_A( {")
            .unwrap_err();
        assert!(matches!(err, BackendError::Compile { .. }));
        assert!(backend.active_effect().is_none());
    }

    #[test]
    fn unsupported_language_rejected() {
        let mut backend = HeadlessBackend::new();
        let err = backend
            .compile_effect(ShaderLanguage::Glsl, "Test", PROGRAM)
            .unwrap_err();
        assert_eq!(err, BackendError::UnsupportedLanguage(ShaderLanguage::Glsl));
        assert_eq!(backend.stats().effect_compiles, 0);
    }

    #[test]
    fn failed_selection_keeps_technique() {
        let mut backend = backend_with_program();
        backend.select_technique("Green").unwrap();
        let err = backend.select_technique("Blue").unwrap_err();
        assert_eq!(err, BackendError::TechniqueNotFound("Blue".into()));
        assert_eq!(backend.active_technique(), Some("Green"));
    }

    #[test]
    fn unknown_parameter_rejected() {
        let mut backend = backend_with_program();
        let err = backend
            .set_uniform("NoSuchParameter", UniformValue::Float(1.0))
            .unwrap_err();
        assert!(matches!(err, BackendError::UnknownParameter(_)));
    }

    #[test]
    fn uniform_uploads_counted_per_name() {
        let mut backend = backend_with_program();
        backend
            .set_uniform(PARAMETER_NAMES[0], UniformValue::Float(1.0))
            .unwrap();
        backend
            .set_uniform(PARAMETER_NAMES[0], UniformValue::Float(2.0))
            .unwrap();
        backend
            .set_uniform(PARAMETER_NAMES[1], UniformValue::Float(3.0))
            .unwrap();
        assert!(backend.set_uniform("Nope", UniformValue::Float(0.0)).is_err());

        let stats = backend.stats();
        assert_eq!(stats.uniform_uploads_of(PARAMETER_NAMES[0]), 2);
        assert_eq!(stats.total_uniform_uploads(), 3);
        assert_eq!(backend.uniform(PARAMETER_NAMES[0]), Some(UniformValue::Float(2.0)));
    }

    #[test]
    fn uniform_without_program_rejected() {
        let mut backend = HeadlessBackend::new();
        let err = backend
            .set_uniform(PARAMETER_NAMES[0], UniformValue::Float(1.0))
            .unwrap_err();
        assert_eq!(err, BackendError::NoActiveEffect);
    }

    #[test]
    fn draw_records_metrics() {
        let mut backend = backend_with_program();
        backend.select_technique("Red").unwrap();
        let vb = backend
            .create_vertex_buffer("v", &[Vertex::new([0.0; 3], [1.0; 4]); 3])
            .unwrap();
        let ib = backend.create_index_buffer("i", &[0, 1, 2]).unwrap();

        backend.begin_frame();
        backend.draw_indexed(vb, ib, 1).unwrap();
        backend.draw_indexed(vb, ib, 1).unwrap();
        assert_eq!(
            backend.metrics(),
            DrawMetrics {
                draw_count: 2,
                primitive_count: 2
            }
        );

        backend.begin_frame();
        assert_eq!(backend.metrics(), DrawMetrics::default());
        assert_eq!(backend.stats().draw_calls, 2);
        assert_eq!(backend.draws()[0].technique, "Red");
    }

    #[test]
    fn draw_rejects_swapped_or_short_buffers() {
        let mut backend = backend_with_program();
        backend.select_technique("Red").unwrap();
        let vb = backend
            .create_vertex_buffer("v", &[Vertex::new([0.0; 3], [1.0; 4]); 3])
            .unwrap();
        let ib = backend.create_index_buffer("i", &[0, 1, 2]).unwrap();

        assert!(backend.draw_indexed(ib, vb, 1).is_err());
        assert!(backend.draw_indexed(vb, ib, 2).is_err());
    }

    #[test]
    fn volume_sample_count_checked() {
        let mut backend = backend_with_program();
        let dim = GridDimension::cube(2);
        assert!(matches!(
            backend.create_volume_texture("vol", dim, &[0.0; 7]),
            Err(BackendError::SampleCountMismatch { .. })
        ));
        let handle = backend.create_volume_texture("vol", dim, &[0.0; 8]).unwrap();
        assert_eq!(backend.bound_volume(), Some(handle));
    }

    #[test]
    fn released_volume_is_unbound() {
        let mut backend = backend_with_program();
        let dim = GridDimension::cube(2);
        let first = backend.create_volume_texture("a", dim, &[0.0; 8]).unwrap();
        let second = backend.create_volume_texture("b", dim, &[1.0; 8]).unwrap();
        assert_eq!(backend.live_volume_count(), 2);

        backend.release_volume_texture(first);
        assert_eq!(backend.live_volume_count(), 1);
        assert_eq!(backend.bound_volume(), Some(second));

        backend.release_volume_texture(second);
        backend.release_volume_texture(second);
        assert_eq!(backend.live_volume_count(), 0);
        assert_eq!(backend.bound_volume(), None);
    }

    #[test]
    fn oversized_volume_rejected() {
        let mut backend = backend_with_program();
        let dim = GridDimension::new(MAX_VOLUME_EXTENT + 1, 1, 1);
        assert!(matches!(
            backend.create_volume_texture("vol", dim, &[]),
            Err(BackendError::VolumeTooLarge { .. })
        ));
    }
}
