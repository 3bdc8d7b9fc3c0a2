use volterra_common::FrameTime;

use crate::component::{Component, DebugInfo, Updateable};

/// Adapter and surface the testbed renders to.
///
/// The owner of the graphics context pushes changes (resize, full screen
/// toggle); the info text is refreshed on the next update.
#[derive(Debug, Clone)]
pub struct GraphicsEnvironment {
    adapter: String,
    width: u32,
    height: u32,
    full_screen: bool,
    info: String,
    debug_order: i32,
    update_order: i32,
}

impl GraphicsEnvironment {
    pub fn new(adapter: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            adapter: adapter.into(),
            width,
            height,
            full_screen: false,
            info: String::new(),
            debug_order: 0,
            update_order: 0,
        }
    }

    pub fn with_orders(mut self, debug_order: i32, update_order: i32) -> Self {
        self.debug_order = debug_order;
        self.update_order = update_order;
        self
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn set_full_screen(&mut self, full_screen: bool) {
        self.full_screen = full_screen;
    }
}

impl Component for GraphicsEnvironment {}

impl Updateable for GraphicsEnvironment {
    fn update_order(&self) -> i32 {
        self.update_order
    }

    fn update(&mut self, _time: &FrameTime) {
        self.info = format!(
            "Device: {}\nResolution: {} x {}\nFull screen: {}",
            self.adapter, self.width, self.height, self.full_screen
        );
    }
}

impl DebugInfo for GraphicsEnvironment {
    fn debug_order(&self) -> i32 {
        self.debug_order
    }

    fn description(&self) -> &str {
        "Graphics Environment"
    }

    fn debug_info(&self) -> String {
        self.info.clone()
    }
}

/// Operating system, engine and process the testbed runs in. Fixed for the
/// lifetime of the process.
#[derive(Debug, Clone)]
pub struct SoftwareEnvironment {
    info: String,
    debug_order: i32,
}

impl SoftwareEnvironment {
    /// Describe the running process `process` at `version`.
    pub fn new(process: &str, version: &str) -> Self {
        let bits = if cfg!(target_pointer_width = "64") {
            " (64-bit)"
        } else {
            ""
        };
        let info = format!(
            "Operating System: {} {}\nEngine: volterra {}\nProcess: {} V{}{}",
            std::env::consts::OS,
            std::env::consts::ARCH,
            env!("CARGO_PKG_VERSION"),
            process,
            version,
            bits
        );
        Self {
            info,
            debug_order: 0,
        }
    }

    pub fn with_debug_order(mut self, debug_order: i32) -> Self {
        self.debug_order = debug_order;
        self
    }
}

impl Component for SoftwareEnvironment {}

impl DebugInfo for SoftwareEnvironment {
    fn debug_order(&self) -> i32 {
        self.debug_order
    }

    fn description(&self) -> &str {
        "Software Environment"
    }

    fn debug_info(&self) -> String {
        self.info.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphics_environment_refreshes_on_update() {
        let mut env = GraphicsEnvironment::new("Test Adapter", 800, 600);
        assert_eq!(env.debug_info(), "");

        env.update(&FrameTime::default());
        assert_eq!(
            env.debug_info(),
            "Device: Test Adapter\nResolution: 800 x 600\nFull screen: false"
        );

        env.resize(1920, 1080);
        env.set_full_screen(true);
        env.update(&FrameTime::default());
        assert!(env.debug_info().contains("1920 x 1080"));
        assert!(env.debug_info().ends_with("Full screen: true"));
    }

    #[test]
    fn software_environment_describes_process() {
        let env = SoftwareEnvironment::new("volterra-cli", "1.2.3").with_debug_order(4);
        let info = env.debug_info();
        assert!(info.contains(std::env::consts::OS));
        assert!(info.contains("Process: volterra-cli V1.2.3"));
        assert_eq!(env.debug_order(), 4);
        assert_eq!(env.description(), "Software Environment");
    }
}
