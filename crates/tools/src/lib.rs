//! Developer tooling: component registry, debug-info components, frame timing.
//!
//! Components declare their capabilities by implementing [`Updateable`],
//! [`Drawable`] and [`DebugInfo`]; the owner registers each capability
//! explicitly with a [`ComponentRegistry`].
//!
//! # Invariants
//! - Each capability list is kept sorted by its order key; equal keys keep
//!   registration order.
//! - Disabled components are skipped by every pass.

mod component;
mod environment;
mod performance;
mod registry;

pub use component::{Component, DebugInfo, Drawable, FrameContext, Updateable};
pub use environment::{GraphicsEnvironment, SoftwareEnvironment};
pub use performance::{FrameTimer, GraphicsPerformance, PerformanceSnapshot};
pub use registry::{ComponentRegistry, DebugEntry};

pub fn crate_info() -> &'static str {
    "volterra-tools v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("tools"));
    }
}
