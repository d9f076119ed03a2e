// =============================================================================
// VULKAN TRIANGLE - Minimal single-frame-in-flight renderer
// =============================================================================
//
// FRAME FLOW:
// 1. Wait for the previous frame's fence, then reset it
// 2. Acquire swapchain image
// 3. Re-record the command buffer (clear + one triangle)
// 4. Submit, signalling the fence
// 5. Present
//
// =============================================================================

mod backend;
mod config;
mod error;
mod renderer;

use anyhow::{Context, Result};
use config::Config;
use log::LevelFilter;
use renderer::Renderer;
use std::fs::File;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let (config, source) = Config::load();

    init_logging(&config)?;
    log::info!("Starting Vulkan triangle");
    source.log();
    log::debug!("Config: {:?}", config);
    log::info!(
        "Window: {}x{}, present mode: {}",
        config.window.width,
        config.window.height,
        config.graphics.present_mode
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    if let Some(err) = app.failure.take() {
        return Err(err);
    }

    log::info!("Exited cleanly");
    Ok(())
}

/// Configured level, overridable through `RUST_LOG`, optionally to a file
fn init_logging(config: &Config) -> Result<()> {
    let level = config
        .debug
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.parse_default_env();

    if let Some(path) = &config.debug.log_file {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file {:?}", path))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("Logger already initialised")?;
    Ok(())
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters: the renderer (and its surface) must drop before
/// the window it was created for.
struct App {
    config: Config,
    renderer: Option<Renderer>,
    window: Option<Window>,
    consecutive_failures: u32,
    /// Set when the loop is left because of an error
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            consecutive_failures: 0,
            failure: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{:#}", err);
        self.failure = Some(err);
        event_loop.exit();
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        match renderer.draw_frame() {
            Ok(()) => self.consecutive_failures = 0,
            Err(e) => {
                self.consecutive_failures += 1;
                log::error!("Frame failed: {}", e);

                let limit = self.config.graphics.max_consecutive_frame_failures;
                if limit > 0 && self.consecutive_failures >= limit {
                    let err = anyhow::Error::new(e).context(format!(
                        "{} consecutive frames failed",
                        self.consecutive_failures
                    ));
                    self.fail(event_loop, err);
                }
            }
        }
    }
}

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => w,
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        match Renderer::new(&window, &self.config) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to initialize Vulkan"));
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => self.draw(event_loop),

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    /// Keep drawing continuously.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Tear down while the window still exists
        self.renderer = None;
    }
}
