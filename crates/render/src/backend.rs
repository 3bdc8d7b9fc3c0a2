use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use volterra_common::GridDimension;

use crate::shader::ShaderLanguage;

/// Handle to a vertex or index buffer owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u32);

/// Handle to a 3D volume texture owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

/// Handle to a compiled effect program owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectHandle(pub u32);

/// The single vertex layout used by every technique: position plus color.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl Vertex {
    pub const fn new(position: [f32; 3], color: [f32; 4]) -> Self {
        Self { position, color }
    }
}

/// A value pushed to a named shader parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Mat4(Mat4),
    Vec3(Vec3),
    Float(f32),
}

impl UniformValue {
    /// Raw little-endian bytes in shader layout (column-major for matrices).
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Mat4(m) => bytemuck::cast_slice(&m.to_cols_array()).to_vec(),
            Self::Vec3(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            Self::Float(f) => f.to_le_bytes().to_vec(),
        }
    }
}

/// Draw statistics of the current frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawMetrics {
    /// Number of draw calls issued since `begin_frame`.
    pub draw_count: u64,
    /// Number of primitives submitted since `begin_frame`.
    pub primitive_count: u64,
}

/// Errors reported by a graphics backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("unknown shader parameter \"{0}\"")]
    UnknownParameter(String),
    #[error("no shader technique named \"{0}\" in the active effect")]
    TechniqueNotFound(String),
    #[error("no effect program is active")]
    NoActiveEffect,
    #[error("shader language {0} is not supported by this backend")]
    UnsupportedLanguage(ShaderLanguage),
    #[error("failed to compile effect \"{name}\": {message}")]
    Compile { name: String, message: String },
    #[error("invalid buffer handle {0:?}")]
    InvalidBuffer(BufferHandle),
    #[error("volume of {dimension} exceeds the backend limit of {max} per axis")]
    VolumeTooLarge { dimension: GridDimension, max: u32 },
    #[error("volume of {dimension} needs {expected} samples, got {actual}")]
    SampleCountMismatch {
        dimension: GridDimension,
        expected: usize,
        actual: usize,
    },
}

/// Everything the raycasting core needs from the host graphics framework:
/// program creation, a set-by-name parameter store, technique selection,
/// buffer/texture creation and an indexed triangle-list draw.
///
/// Implementations are driven from a single frame loop thread.
pub trait GraphicsBackend {
    /// Compile an effect program and make it the active one.
    fn compile_effect(
        &mut self,
        language: ShaderLanguage,
        name: &str,
        source: &[u8],
    ) -> Result<EffectHandle, BackendError>;

    /// Release a program. Releasing the active program leaves none active.
    fn release_effect(&mut self, effect: EffectHandle);

    /// Technique names exposed by the active program.
    fn techniques(&self) -> Vec<String>;

    /// Select a technique of the active program. On error the previously
    /// selected technique stays active.
    fn select_technique(&mut self, name: &str) -> Result<(), BackendError>;

    /// Push a value to a named parameter of the active program.
    fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), BackendError>;

    fn create_vertex_buffer(
        &mut self,
        label: &str,
        vertices: &[Vertex],
    ) -> Result<BufferHandle, BackendError>;

    fn create_index_buffer(
        &mut self,
        label: &str,
        indices: &[u32],
    ) -> Result<BufferHandle, BackendError>;

    /// Upload a scalar volume and bind it as the active program's density
    /// texture.
    fn create_volume_texture(
        &mut self,
        label: &str,
        dimension: GridDimension,
        samples: &[f32],
    ) -> Result<TextureHandle, BackendError>;

    /// Free a volume texture. Unknown handles are ignored.
    fn release_volume_texture(&mut self, texture: TextureHandle);

    /// Draw `primitive_count` triangles from an indexed triangle list with the
    /// active technique.
    fn draw_indexed(
        &mut self,
        vertices: BufferHandle,
        indices: BufferHandle,
        primitive_count: u32,
    ) -> Result<(), BackendError>;

    /// Reset per-frame draw metrics.
    fn begin_frame(&mut self);

    fn metrics(&self) -> DrawMetrics;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mat4_bytes_are_column_major() {
        let m = Mat4::from_cols_array(&[
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0,
        ]);
        let bytes = UniformValue::Mat4(m).to_bytes();
        assert_eq!(bytes.len(), 64);
        let float_at = |i: usize| f32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
        assert_eq!(float_at(0), 1.0);
        assert_eq!(float_at(4), 5.0);
    }

    #[test]
    fn vec3_and_float_sizes() {
        assert_eq!(UniformValue::Vec3(Vec3::ONE).to_bytes().len(), 12);
        assert_eq!(UniformValue::Float(0.5).to_bytes(), 0.5f32.to_le_bytes().to_vec());
    }

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 28);
    }
}
