//! Keimo demo application
//!
//! Opens a window and renders the configured model (a textured quad by
//! default) spinning about Z. Escape quits; Space forces a swapchain rebuild.
//!
//! Usage: `keimo [config.toml | config.ron]`

use std::path::PathBuf;
use std::process::ExitCode;

use keimo_engine::config::ConfigError;
use keimo_engine::foundation::logging;
use keimo_engine::prelude::*;
use keimo_engine::render::window::WindowError;
use thiserror::Error;

#[derive(Error, Debug)]
enum AppError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("window: {0}")]
    Window(#[from] WindowError),

    #[error("renderer: {0}")]
    Renderer(#[from] VulkanError),
}

struct App {
    // Declared before the window so GPU objects go first
    renderer: Renderer,
    window: GlfwWindow,
    clock: FrameClock,
    fps: FpsCounter,
}

impl App {
    fn new(config: &EngineConfig) -> Result<Self, AppError> {
        let mut window = GlfwWindow::new(&config.window)?;
        let renderer = Renderer::new(&mut window, config)?;
        Ok(Self {
            renderer,
            window,
            clock: FrameClock::new(),
            fps: FpsCounter::default(),
        })
    }

    fn run(&mut self) -> Result<(), AppError> {
        let mut rebuild_requested = false;

        while !self.window.should_close() {
            for event in self.window.poll_events() {
                match event {
                    WindowEvent::Close | WindowEvent::KeyPressed(Key::Escape) => {
                        self.window.set_should_close(true);
                    }
                    WindowEvent::KeyPressed(Key::Space) => rebuild_requested = true,
                    WindowEvent::Resized(width, height) => {
                        log::debug!("Window resized to {}x{}", width, height);
                    }
                    WindowEvent::KeyPressed(Key::Other) => {}
                }
            }
            if self.window.should_close() {
                break;
            }

            let size = self.window.drawable_size();
            if size.0 == 0 || size.1 == 0 {
                // Minimized: nothing to present until the window comes back
                self.window.wait_events();
                continue;
            }

            if rebuild_requested {
                self.renderer.force_rebuild(size)?;
                rebuild_requested = false;
            }

            self.renderer.update_uniforms(self.clock.elapsed_secs())?;
            self.renderer.draw_frame(size)?;

            let frame_time = self.clock.tick();
            if let Some(fps) = self.fps.record(frame_time) {
                let stats = self.renderer.stats();
                log::info!(
                    "{:.1} FPS ({} frames, {} rebuilds)",
                    fps,
                    stats.frames_presented,
                    stats.rebuilds
                );
            }
        }

        Ok(())
    }
}

fn load_config() -> Result<EngineConfig, AppError> {
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => EngineConfig::load_from_file(&path)?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn run() -> Result<(), AppError> {
    let config = load_config()?;
    logging::init_with_default_filter(&config.log_level);
    log::info!("Starting {}", config.window.title);

    let mut app = App::new(&config)?;
    app.run()
}

fn main() -> ExitCode {
    let result = run();
    // No-op if run() got far enough to install the configured filter
    logging::init_with_default_filter("info");

    match result {
        Ok(()) => {
            log::info!("Shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
