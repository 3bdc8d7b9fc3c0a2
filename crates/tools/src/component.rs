use volterra_common::FrameTime;
use volterra_render::DrawMetrics;

/// Per-frame input to [`Drawable::draw`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameContext {
    pub time: FrameTime,
    /// Draw statistics of the frame being presented.
    pub metrics: DrawMetrics,
}

/// Base capability shared by every registered component.
pub trait Component {
    /// Disabled components are skipped by the registry.
    fn enabled(&self) -> bool {
        true
    }
}

pub trait Updateable: Component {
    fn update_order(&self) -> i32 {
        0
    }

    fn update(&mut self, time: &FrameTime);
}

pub trait Drawable: Component {
    fn draw_order(&self) -> i32 {
        0
    }

    fn draw(&mut self, frame: &FrameContext);
}

/// A source of text for the debug overlay.
pub trait DebugInfo: Component {
    fn debug_order(&self) -> i32 {
        0
    }

    /// Heading the info is shown under.
    fn description(&self) -> &str;

    fn debug_info(&self) -> String;

    fn debug_output_enabled(&self) -> bool {
        true
    }
}
