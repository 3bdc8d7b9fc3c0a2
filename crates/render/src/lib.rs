//! Renderer-agnostic volume raycasting.
//!
//! The raycast effect drives a per-pixel ray march through a density volume
//! by drawing one full-screen quad. Everything the effect needs from the host
//! graphics framework goes through [`GraphicsBackend`]; [`HeadlessBackend`]
//! records those calls in memory.
//!
//! # Invariants
//! - The effect owns its backend; GPU resources live as long as the backend.
//! - The shader language is detected once per graphics context and passed
//!   down explicitly.
//! - Technique names are the fragment entry points `fs_<Technique>` of the
//!   loaded program.

mod backend;
mod camera;
mod effect;
mod headless;
mod quad;
mod shader;
pub mod shaders;

pub use backend::{
    BackendError, BufferHandle, DrawMetrics, EffectHandle, GraphicsBackend, TextureHandle,
    UniformValue, Vertex,
};
pub use camera::{CameraDirtyFlags, CameraError, CameraSettings, FreeCamera, Frustum};
pub use effect::{
    CAMERA_POSITION_WORLD_SPACE, DirtyFlags, EffectError, EffectMode,
    INVERSE_VIEW_PROJECTION_MATRIX, PARAMETER_NAMES, RaycastEffect, VOLUME_DIMENSION,
    WORLD_VIEW_PROJECTION_MATRIX,
};
pub use headless::{DrawCall, HeadlessBackend, HeadlessStats, MAX_VOLUME_EXTENT};
pub use quad::{FULL_SCREEN_QUAD_INDICES, FULL_SCREEN_QUAD_VERTICES, FullScreenQuad, GpuMesh};
pub use shader::{ProgramEntryPoints, ShaderCatalog, ShaderContext, ShaderError, ShaderLanguage};

pub fn crate_info() -> &'static str {
    "volterra-render v0.1.0"
}
