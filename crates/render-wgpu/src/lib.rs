//! wgpu backend for the volume raycasting effect.
//!
//! Implements [`volterra_render::GraphicsBackend`] on a wgpu device. Every
//! `fs_<Technique>` entry point of a compiled WGSL program becomes a render
//! pipeline; draws are recorded during the frame and encoded into one render
//! pass targeting the surface.
//!
//! # Invariants
//! - Only WGSL programs are accepted.
//! - All techniques share one bind group: parameters at binding 0, the
//!   density volume at binding 1.

mod gpu;

pub use gpu::{WgpuBackend, uniform_offset};

pub fn crate_info() -> &'static str {
    "volterra-render-wgpu v0.1.0"
}
