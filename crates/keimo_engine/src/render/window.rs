//! Window management using GLFW
//!
//! The renderer only sees the `WindowSurface` trait: instance extensions, a
//! surface, pending events, and the drawable size. `GlfwWindow` is the
//! implementation the application uses.

use ash::vk;
use thiserror::Error;

use crate::core::WindowConfig;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed: {0}")]
    InitializationFailed(String),

    /// Window creation failed
    #[error("Window creation failed")]
    CreationFailed,

    /// Vulkan is not usable through the window system
    #[error("Vulkan unsupported by window system: {0}")]
    VulkanUnsupported(String),

    /// Surface creation returned an error code
    #[error("Failed to create Vulkan surface: {0:?}")]
    SurfaceCreation(vk::Result),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// Keys the engine reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Escape
    Escape,
    /// Space bar
    Space,
    /// Anything else
    Other,
}

/// Window events relevant to the renderer and application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// User asked to close the window
    Close,
    /// Drawable size changed, in pixels
    Resized(u32, u32),
    /// Key pressed
    KeyPressed(Key),
}

/// What the renderer needs from a window
pub trait WindowSurface {
    /// Instance extensions needed to present to this window
    fn required_instance_extensions(&self) -> WindowResult<Vec<String>>;

    /// Create a surface for this window on `instance`
    fn create_surface(&mut self, instance: &ash::Instance) -> WindowResult<vk::SurfaceKHR>;

    /// Pump the event queue and return what happened since the last call
    fn poll_events(&mut self) -> Vec<WindowEvent>;

    /// Current framebuffer size in pixels
    fn drawable_size(&self) -> (u32, u32);
}

/// GLFW window configured for Vulkan (no client API)
pub struct GlfwWindow {
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    glfw: glfw::Glfw,
}

impl GlfwWindow {
    /// Create a window from configuration
    pub fn new(config: &WindowConfig) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| WindowError::InitializationFailed(format!("{:?}", e)))?;

        if !glfw.vulkan_supported() {
            return Err(WindowError::VulkanUnsupported("no Vulkan loader found".to_string()));
        }

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(config.resizable));
        glfw.window_hint(glfw::WindowHint::Visible(config.visible));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        log::debug!("Created {}x{} window {:?}", config.width, config.height, config.title);

        Ok(Self { window, events, glfw })
    }

    /// Whether the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request the window to close at the end of the frame
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Block until at least one event arrives
    pub fn wait_events(&mut self) {
        self.glfw.wait_events();
    }

    fn translate(event: glfw::WindowEvent) -> Option<WindowEvent> {
        match event {
            glfw::WindowEvent::Close => Some(WindowEvent::Close),
            glfw::WindowEvent::FramebufferSize(width, height) => {
                Some(WindowEvent::Resized(width.max(0) as u32, height.max(0) as u32))
            }
            glfw::WindowEvent::Key(key, _, glfw::Action::Press, _) => Some(WindowEvent::KeyPressed(match key {
                glfw::Key::Escape => Key::Escape,
                glfw::Key::Space => Key::Space,
                _ => Key::Other,
            })),
            _ => None,
        }
    }
}

impl WindowSurface for GlfwWindow {
    fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| WindowError::VulkanUnsupported("no surface extensions reported".to_string()))
    }

    fn create_surface(&mut self, instance: &ash::Instance) -> WindowResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance.handle(), std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::SurfaceCreation(result))
        }
    }

    fn poll_events(&mut self) -> Vec<WindowEvent> {
        self.glfw.poll_events();
        glfw::flush_messages(&self.events)
            .filter_map(|(_, event)| Self::translate(event))
            .collect()
    }

    fn drawable_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }
}
