use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::Vec3;
use tracing_subscriber::EnvFilter;
use volterra_common::{FrameTime, TestbedConfig};
use volterra_field::DensityField;
use volterra_render::{
    CameraSettings, EffectMode, FreeCamera, GraphicsBackend, HeadlessBackend, RaycastEffect,
    ShaderCatalog, ShaderContext, shaders,
};
use volterra_tools::{
    ComponentRegistry, FrameContext, GraphicsEnvironment, GraphicsPerformance,
    SoftwareEnvironment,
};

/// Simulated frame duration of the headless loop.
const FRAME_TIME: Duration = Duration::from_micros(16_667);

#[derive(Parser)]
#[command(name = "volterra-cli", about = "Headless tools for the volumetric terrain testbed")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Testbed configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version, crate info and the embedded shader catalog
    Info,
    /// Generate a solid sphere density field and print its statistics
    Sphere {
        /// Samples per axis (defaults to the configured field dimension)
        #[arg(short, long)]
        dimension: Option<i32>,
    },
    /// Run the raycast effect against the headless backend
    Frames {
        /// Number of frames to simulate
        #[arg(short = 'n', long, default_value = "120")]
        count: u32,
        /// Rendering mode (defaults to the configured mode)
        #[arg(short, long)]
        mode: Option<String>,
        /// Samples per axis of the density field
        #[arg(short, long)]
        dimension: Option<i32>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = match &cli.config {
        Some(path) => TestbedConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => TestbedConfig::default(),
    };

    match cli.command {
        Commands::Info => info(),
        Commands::Sphere { dimension } => sphere(dimension.unwrap_or(config.field_dimension)),
        Commands::Frames {
            count,
            mode,
            dimension,
        } => {
            let mode = mode.unwrap_or_else(|| config.mode.clone());
            let dimension = dimension.unwrap_or(config.field_dimension);
            frames(&config, count, &mode, dimension)
        }
    }
}

fn info() -> anyhow::Result<()> {
    println!("volterra-cli v{}", env!("CARGO_PKG_VERSION"));
    println!("common: {}", volterra_common::crate_info());
    println!("field: {}", volterra_field::crate_info());
    println!("render: {}", volterra_render::crate_info());
    println!("tools: {}", volterra_tools::crate_info());

    let catalog = ShaderCatalog::builtin();
    println!("shader resources:");
    for name in catalog.names() {
        println!("  {name}");
    }
    println!("modes:");
    for mode in EffectMode::ALL {
        println!("  {mode}");
    }
    Ok(())
}

fn sphere(dimension: i32) -> anyhow::Result<()> {
    let field = DensityField::solid_sphere(dimension)
        .with_context(|| format!("generating a solid sphere of dimension {dimension}"))?;
    let expected = std::f64::consts::PI / 6.0;
    println!("Solid sphere: {}", field.dimension());
    println!("  samples: {}", field.len());
    println!("  solid: {}", field.solid_count());
    println!(
        "  solid fraction: {:.4} (ideal sphere {:.4})",
        field.solid_fraction(),
        expected
    );
    Ok(())
}

fn frames(config: &TestbedConfig, count: u32, mode: &str, dimension: i32) -> anyhow::Result<()> {
    let mode: EffectMode = mode.parse()?;
    let field = DensityField::solid_sphere(dimension)?;

    let mut backend = HeadlessBackend::new();
    let catalog = ShaderCatalog::builtin();
    let context = ShaderContext::detect(&mut backend, &catalog, shaders::VOLUME_RAYCASTING_EFFECT)?;
    let mut effect = RaycastEffect::new(backend, &context, &catalog)?;
    effect.set_mode(mode)?;
    effect.set_density_field(&field)?;

    let window = &config.window;
    let extent = dimension as f32;
    let mut camera = FreeCamera::from_settings(CameraSettings {
        position: Vec3::new(0.0, 0.0, extent * 1.5),
        fov_degrees: config.camera.fov_degrees,
        aspect_ratio: window.width as f32 / window.height as f32,
        near: config.camera.near,
        far: config.camera.far,
        ..CameraSettings::default()
    })?;

    let performance = Rc::new(RefCell::new(GraphicsPerformance::new().with_orders(2, 0, 0)));
    let graphics = Rc::new(RefCell::new(
        GraphicsEnvironment::new("headless", window.width, window.height).with_orders(1, 0),
    ));
    let software = Rc::new(RefCell::new(
        SoftwareEnvironment::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")).with_debug_order(0),
    ));
    let mut registry = ComponentRegistry::new();
    registry.register_updateable(performance.clone());
    registry.register_drawable(performance.clone());
    registry.register_debug_info(performance);
    registry.register_updateable(graphics.clone());
    registry.register_debug_info(graphics);
    registry.register_debug_info(software);

    println!("Running {count} headless frames: mode={mode}, field={}", field.dimension());

    let mut time = FrameTime::default();
    for frame in 0..count {
        time = time.advance(FRAME_TIME);
        registry.update_all(&time);

        // Orbit every 30 frames so the cache has something to recompute.
        if frame > 0 && frame % 30 == 0 {
            camera.yaw(0.1);
            camera.move_right(extent * 0.05);
        }

        effect.backend_mut().begin_frame();
        effect.set_view_matrix(camera.view_matrix());
        effect.set_projection_matrix(camera.projection_matrix());
        effect.set_camera_position(camera.position());
        effect.draw_full_screen_quad()?;

        registry.draw_all(&FrameContext {
            time,
            metrics: effect.backend().metrics(),
        });
    }

    let stats = effect.backend().stats();
    println!("Backend:");
    println!("  effect compiles: {}", stats.effect_compiles);
    println!("  draw calls: {}", stats.draw_calls);
    println!("  vertex buffer uploads: {}", stats.vertex_buffer_uploads);
    println!("  index buffer uploads: {}", stats.index_buffer_uploads);
    println!("  volume uploads: {}", stats.volume_uploads);
    println!("  uniform uploads: {}", stats.total_uniform_uploads());
    for (name, uploads) in &stats.uniform_uploads {
        println!("    {name}: {uploads}");
    }

    if config.debug_overlay {
        println!();
        for entry in registry.debug_report() {
            println!("{entry}\n");
        }
    }
    Ok(())
}
