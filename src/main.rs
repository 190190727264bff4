use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use log::info;
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use pbr_viewer::{
    assets, ibl, Application, GraphicsContext, RenderSettings, SceneAssets, Texture,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;

    let environment = assets::load_environment(&options.environment)?;
    println!(
        "Environment: {}x{} RGBM",
        environment.width(),
        environment.height()
    );
    match &options.brdf_lut {
        Some(path) => println!("BRDF LUT: {}", path.display()),
        None => println!(
            "BRDF LUT: built-in {0}x{0}",
            assets::BUILTIN_BRDF_LUT_SIZE
        ),
    }
    let settings = match &options.settings {
        Some(path) => assets::load_settings(path)?,
        None => RenderSettings::default(),
    };
    println!(
        "Toggles: direct({}, {}) indirect({}, {})",
        settings.direct_diffuse,
        settings.direct_specular,
        settings.indirect_diffuse,
        settings.indirect_specular
    );

    if options.summary_only {
        return Ok(());
    }

    if let Some(dir) = &options.bake_dir {
        return run_bake(environment, dir);
    }

    let brdf_lut = match &options.brdf_lut {
        Some(path) => assets::load_brdf_lut(path)?,
        None => assets::builtin_brdf_lut(assets::BUILTIN_BRDF_LUT_SIZE),
    };
    run_interactive(
        SceneAssets {
            environment,
            brdf_lut,
        },
        settings,
    )
}

/// Runs the lighting precompute headless and writes the baked maps out.
fn run_bake(environment: Texture, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let mut context =
        block_on(GraphicsContext::headless()).context("failed to initialize the GPU")?;
    let handle = context.upload_texture(&environment);
    let baked = ibl::bake(
        &mut context,
        handle,
        environment.width(),
        environment.height(),
    )
    .context("lighting precompute failed")?;

    let irradiance_path = dir.join("irradiance.png");
    assets::write_png(
        &irradiance_path,
        baked.irradiance.width(),
        baked.irradiance.height(),
        baked.irradiance.pixels(),
    )?;
    let atlas_path = dir.join("specular-atlas.png");
    assets::write_png(
        &atlas_path,
        baked.specular_atlas.width(),
        baked.specular_atlas.height(),
        baked.specular_atlas.pixels(),
    )?;
    println!(
        "Baked {} and {}",
        irradiance_path.display(),
        atlas_path.display()
    );
    Ok(())
}

fn run_interactive(scene_assets: SceneAssets, settings: RenderSettings) -> Result<()> {
    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            eprintln!(
                "{err}. No window available; exiting after the summary (set DISPLAY to enable rendering)."
            );
            return Ok(());
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut viewer = Viewer {
        staged: Some((scene_assets, settings)),
        app: None,
        window: None,
        cursor: Vec2::ZERO,
        error: None,
    };
    event_loop
        .run_app(&mut viewer)
        .context("event loop failed")?;

    if let Some(err) = viewer.error {
        return Err(err);
    }
    Ok(())
}

/// Event-loop driver; owns the application once the window exists.
struct Viewer {
    staged: Option<(SceneAssets, RenderSettings)>,
    app: Option<Application>,
    window: Option<Arc<Window>>,
    cursor: Vec2,
    error: Option<anyhow::Error>,
}

impl Viewer {
    fn initialize(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title("pbr-viewer")
                        .with_inner_size(winit::dpi::LogicalSize::new(1280.0, 720.0)),
                )
                .context("failed to create the window")?,
        );
        let context = block_on(GraphicsContext::new(Arc::clone(&window)))
            .context("failed to initialize the GPU")?;
        let (scene_assets, settings) = self
            .staged
            .take()
            .ok_or_else(|| anyhow!("application already initialized"))?;
        self.app = Some(Application::new(context, scene_assets, settings)?);
        self.window = Some(window);
        info!("window and renderer ready");
        Ok(())
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.app.is_some() {
            return;
        }
        if let Err(err) = self.initialize(event_loop) {
            self.error = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(app) = self.app.as_mut() else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => app.resize(size.width, size.height),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed {
                    match event.physical_key {
                        PhysicalKey::Code(KeyCode::ArrowUp | KeyCode::KeyW) => {
                            app.camera_mut().dolly(-1.0);
                        }
                        PhysicalKey::Code(KeyCode::ArrowDown | KeyCode::KeyS) => {
                            app.camera_mut().dolly(1.0);
                        }
                        _ => {}
                    }
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => app.camera_mut().on_pointer_down(self.cursor),
                ElementState::Released => app.camera_mut().on_pointer_up(),
            },
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Vec2::new(position.x as f32, position.y as f32);
                app.camera_mut().on_pointer_move(self.cursor);
            }
            WindowEvent::CursorLeft { .. } => app.camera_mut().on_pointer_up(),
            WindowEvent::RedrawRequested => {
                if let Err(err) = app.render() {
                    self.error = Some(err);
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

struct CliOptions {
    environment: PathBuf,
    brdf_lut: Option<PathBuf>,
    settings: Option<PathBuf>,
    bake_dir: Option<PathBuf>,
    summary_only: bool,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let usage = "Usage: pbr-viewer <environment.png> [--brdf-lut <png>] \
                     [--settings <json>] [--bake <dir>] [--summary-only]";
        let mut environment = None;
        let mut brdf_lut = None;
        let mut settings = None;
        let mut bake_dir = None;
        let mut summary_only = false;

        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--brdf-lut" => {
                    brdf_lut = Some(PathBuf::from(
                        args.next().ok_or_else(|| anyhow!("--brdf-lut needs a path"))?,
                    ));
                }
                "--settings" => {
                    settings = Some(PathBuf::from(
                        args.next().ok_or_else(|| anyhow!("--settings needs a path"))?,
                    ));
                }
                "--bake" => {
                    bake_dir = Some(PathBuf::from(
                        args.next().ok_or_else(|| anyhow!("--bake needs a directory"))?,
                    ));
                }
                "--summary-only" => summary_only = true,
                other if other.starts_with("--") => {
                    return Err(anyhow!("Unknown argument: {other}. {usage}"));
                }
                other => {
                    if environment.is_some() {
                        return Err(anyhow!("Unexpected argument: {other}. {usage}"));
                    }
                    environment = Some(PathBuf::from(other));
                }
            }
        }

        Ok(Self {
            environment: environment.ok_or_else(|| anyhow!("{usage}"))?,
            brdf_lut,
            settings,
            bake_dir,
            summary_only,
        })
    }
}
