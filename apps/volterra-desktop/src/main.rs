use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec3;
use std::cell::RefCell;
use std::collections::HashSet;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use volterra_common::{FrameTime, TestbedConfig};
use volterra_field::DensityField;
use volterra_render::{
    CameraSettings, EffectMode, FreeCamera, GraphicsBackend, RaycastEffect, ShaderCatalog,
    ShaderContext, shaders,
};
use volterra_render_wgpu::WgpuBackend;
use volterra_tools::{
    Component, ComponentRegistry, FrameContext, GraphicsEnvironment, GraphicsPerformance,
    SoftwareEnvironment,
};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Fullscreen, Window, WindowId};

/// How often the debug report is logged when the overlay is enabled.
const REPORT_INTERVAL: Duration = Duration::from_secs(5);
const MOUSE_SENSITIVITY: f32 = 0.003;

#[derive(Parser)]
#[command(name = "volterra-desktop", about = "Volumetric terrain raycasting testbed")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Testbed configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Initial rendering mode
    #[arg(short, long)]
    mode: Option<String>,

    /// Samples per axis of the density field
    #[arg(short, long)]
    dimension: Option<i32>,
}

/// Everything that lives independently of the GPU context.
struct AppState {
    config: TestbedConfig,
    initial_mode: EffectMode,
    field: DensityField,
    camera: FreeCamera,
    registry: ComponentRegistry,
    performance: Rc<RefCell<GraphicsPerformance>>,
    graphics: Option<Rc<RefCell<GraphicsEnvironment>>>,
    keys_held: HashSet<KeyCode>,
    mouse_captured: bool,
    last_frame: Instant,
    time: FrameTime,
    since_report: Duration,
}

impl AppState {
    fn new(config: TestbedConfig) -> Result<Self> {
        let initial_mode: EffectMode = config.mode.parse()?;
        let field = DensityField::solid_sphere(config.field_dimension)?;
        let extent = config.field_dimension as f32;
        let camera = FreeCamera::from_settings(CameraSettings {
            position: Vec3::new(0.0, 0.0, extent * 1.5),
            fov_degrees: config.camera.fov_degrees,
            aspect_ratio: config.window.width as f32 / config.window.height as f32,
            near: config.camera.near,
            far: config.camera.far,
            ..CameraSettings::default()
        })?;

        let performance = Rc::new(RefCell::new(GraphicsPerformance::new().with_orders(2, 0, 0)));
        let software = Rc::new(RefCell::new(
            SoftwareEnvironment::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        ));
        let mut registry = ComponentRegistry::new();
        registry.register_updateable(performance.clone());
        registry.register_drawable(performance.clone());
        registry.register_debug_info(performance.clone());
        registry.register_debug_info(software);

        Ok(Self {
            config,
            initial_mode,
            field,
            camera,
            registry,
            performance,
            graphics: None,
            keys_held: HashSet::new(),
            mouse_captured: false,
            last_frame: Instant::now(),
            time: FrameTime::default(),
            since_report: Duration::ZERO,
        })
    }

    /// Register the graphics environment once the adapter is known.
    fn attach_graphics(&mut self, adapter: &str, width: u32, height: u32) {
        let graphics = Rc::new(RefCell::new(
            GraphicsEnvironment::new(adapter, width, height).with_orders(1, 0),
        ));
        self.registry.register_updateable(graphics.clone());
        self.registry.register_debug_info(graphics.clone());
        self.graphics = Some(graphics);
    }

    fn resize(&mut self, width: u32, height: u32) {
        if let Err(e) = self
            .camera
            .set_aspect_ratio(width as f32 / height.max(1) as f32)
        {
            tracing::warn!(error = %e, "aspect ratio rejected");
        }
        if let Some(graphics) = &self.graphics {
            graphics.borrow_mut().resize(width, height);
        }
    }

    fn update(&mut self, dt: Duration) {
        self.time = self.time.advance(dt);
        self.since_report += dt;

        let speed = self.config.field_dimension as f32 * 0.5;
        let boost = if self.keys_held.contains(&KeyCode::ShiftLeft) {
            3.0
        } else {
            1.0
        };
        let step = dt.as_secs_f32() * speed * boost;

        if self.keys_held.contains(&KeyCode::KeyW) {
            self.camera.move_forward(step);
        }
        if self.keys_held.contains(&KeyCode::KeyS) {
            self.camera.move_forward(-step);
        }
        if self.keys_held.contains(&KeyCode::KeyA) {
            self.camera.move_right(-step);
        }
        if self.keys_held.contains(&KeyCode::KeyD) {
            self.camera.move_right(step);
        }
        if self.keys_held.contains(&KeyCode::Space) {
            self.camera.move_up(step);
        }
        if self.keys_held.contains(&KeyCode::ControlLeft) {
            self.camera.move_up(-step);
        }

        self.registry.update_all(&self.time);

        if self.config.debug_overlay && self.since_report >= REPORT_INTERVAL {
            self.since_report = Duration::ZERO;
            for entry in self.registry.debug_report() {
                tracing::info!("{entry}");
            }
        }
    }

    fn look(&mut self, dx: f32, dy: f32) {
        self.camera.yaw(-dx * MOUSE_SENSITIVITY);
        if let Err(e) = self.camera.pitch(-dy * MOUSE_SENSITIVITY) {
            tracing::trace!(error = %e, "pitch limit reached");
        }
    }
}

struct GpuApp {
    state: AppState,
    window: Option<Arc<Window>>,
    surface: Option<wgpu::Surface<'static>>,
    surface_config: Option<wgpu::SurfaceConfiguration>,
    effect: Option<RaycastEffect<WgpuBackend>>,
}

impl GpuApp {
    fn new(state: AppState) -> Self {
        Self {
            state,
            window: None,
            surface: None,
            surface_config: None,
            effect: None,
        }
    }

    fn init_gpu(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_config = &self.state.config.window;
        let attrs = Window::default_attributes()
            .with_title("Volumetric Terrain Testbed")
            .with_inner_size(PhysicalSize::new(window_config.width, window_config.height));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no suitable graphics adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("volterra_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("surface reports no formats")?;
        let present_mode = if window_config.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = info.backend.to_str(), "GPU initialized");
        self.state
            .attach_graphics(&info.name, surface_config.width, surface_config.height);
        self.state
            .resize(surface_config.width, surface_config.height);

        let mut backend = WgpuBackend::new(device, queue, surface_format);
        let catalog = ShaderCatalog::builtin();
        let context =
            ShaderContext::detect(&mut backend, &catalog, shaders::VOLUME_RAYCASTING_EFFECT)?;
        let mut effect = RaycastEffect::new(backend, &context, &catalog)?;
        effect.set_mode(self.state.initial_mode)?;
        effect.set_density_field(&self.state.field)?;

        self.window = Some(window);
        self.surface = Some(surface);
        self.surface_config = Some(surface_config);
        self.effect = Some(effect);
        Ok(())
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: KeyCode, pressed: bool) {
        if pressed {
            self.state.keys_held.insert(key);
        } else {
            self.state.keys_held.remove(&key);
            return;
        }

        let mode_index = match key {
            KeyCode::Digit1 => Some(0),
            KeyCode::Digit2 => Some(1),
            KeyCode::Digit3 => Some(2),
            KeyCode::Digit4 => Some(3),
            _ => None,
        };
        if let (Some(index), Some(effect)) = (mode_index, self.effect.as_mut()) {
            if let Err(e) = effect.set_mode(EffectMode::ALL[index]) {
                tracing::warn!(error = %e, "mode change rejected");
            }
            return;
        }

        match key {
            KeyCode::F11 => {
                if let Some(window) = &self.window {
                    let full_screen = window.fullscreen().is_none();
                    window.set_fullscreen(full_screen.then_some(Fullscreen::Borderless(None)));
                    if let Some(graphics) = &self.state.graphics {
                        graphics.borrow_mut().set_full_screen(full_screen);
                    }
                }
            }
            KeyCode::F3 => {
                let mut performance = self.state.performance.borrow_mut();
                let enabled = !performance.enabled();
                performance.set_enabled(enabled);
                tracing::info!(enabled, "performance statistics toggled");
            }
            KeyCode::Escape => event_loop.exit(),
            _ => {}
        }
    }

    fn redraw(&mut self) {
        let now = Instant::now();
        let dt = (now - self.state.last_frame).min(Duration::from_millis(100));
        self.state.last_frame = now;
        self.state.update(dt);

        let (Some(surface), Some(effect)) = (&self.surface, &mut self.effect) else {
            return;
        };

        let output = match surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                if let Some(config) = &self.surface_config {
                    surface.configure(effect.backend().device(), config);
                }
                return;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let camera = &mut self.state.camera;
        effect.backend_mut().begin_frame();
        effect.set_view_matrix(camera.view_matrix());
        effect.set_projection_matrix(camera.projection_matrix());
        effect.set_camera_position(camera.position());
        if let Err(e) = effect.draw_full_screen_quad() {
            tracing::error!(error = %e, "raycast draw failed");
        }
        effect.backend_mut().encode_frame(&view);
        output.present();

        self.state.registry.draw_all(&FrameContext {
            time: self.state.time,
            metrics: effect.backend().metrics(),
        });

        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

impl ApplicationHandler for GpuApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init_gpu(event_loop) {
            tracing::error!("failed to initialize graphics: {e:#}");
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let (Some(surface), Some(effect), Some(config)) =
                    (&self.surface, &self.effect, &mut self.surface_config)
                {
                    config.width = new_size.width.max(1);
                    config.height = new_size.height.max(1);
                    surface.configure(effect.backend().device(), config);
                    self.state.resize(config.width, config.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: key_state,
                        ..
                    },
                ..
            } => {
                self.handle_key(event_loop, key, key_state == ElementState::Pressed);
            }
            WindowEvent::MouseInput {
                button: MouseButton::Right,
                state: btn_state,
                ..
            } => {
                self.state.mouse_captured = btn_state == ElementState::Pressed;
                if let Some(window) = &self.window {
                    window.set_cursor_visible(!self.state.mouse_captured);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.state.mouse_captured {
                self.state.look(delta.0 as f32, delta.1 as f32);
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let mut config = match &cli.config {
        Some(path) => TestbedConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => TestbedConfig::default(),
    };
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(dimension) = cli.dimension {
        config.field_dimension = dimension;
    }
    config.validate()?;

    tracing::info!(field = config.field_dimension, mode = %config.mode, "volterra-desktop starting");

    let state = AppState::new(config)?;
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GpuApp::new(state);
    event_loop.run_app(&mut app)?;

    Ok(())
}
