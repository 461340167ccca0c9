// Platform window
//
// Fixed-size, non-resizable winit window. The event loop is pumped once per
// frame instead of handing control to `run_app`. Native handles go to
// surface creation; a close request raises the flag the frame loop polls.

use crate::config::WindowConfig;
use crate::frame_loop::EventPump;
use anyhow::{bail, Context, Result};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use std::time::Duration;
use thiserror::Error;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    error::OsError,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window as WinitWindow, WindowAttributes, WindowId},
};

/// Pumps allowed for the platform to deliver `resumed` at startup
const STARTUP_PUMPS: usize = 64;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum WindowError {
    /// Caller attempted to reference the winit window before it was created.
    #[error("Window has not been created yet.")]
    NotInitialized,
}

/// Event handler state; owns the winit window once `resumed` ran.
struct WindowState {
    attributes: Option<WindowAttributes>,
    inner: Option<WinitWindow>,
    create_error: Option<OsError>,
    close_requested: bool,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(attributes) = self.attributes.take() else {
            return;
        };
        match event_loop.create_window(attributes) {
            Ok(window) => self.inner = Some(window),
            Err(e) => self.create_error = Some(e),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let WindowEvent::CloseRequested = event {
            log::info!("The close button was pressed; stopping");
            self.close_requested = true;
        }
    }
}

/// Fields drop in order, so the window goes before its event loop.
pub struct PlatformWindow {
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl PlatformWindow {
    /// Create the event loop and the window, pumping until the window exists.
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new().context("Failed to create event loop")?;

        let attributes = WinitWindow::default_attributes()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(false);

        let mut window = Self {
            state: WindowState {
                attributes: Some(attributes),
                inner: None,
                create_error: None,
                close_requested: false,
            },
            event_loop,
        };

        for _ in 0..STARTUP_PUMPS {
            if let PumpStatus::Exit(code) = window.pump() {
                bail!("Event loop exited with code {} before the window was created", code);
            }
            if let Some(e) = window.state.create_error.take() {
                return Err(e).context("Failed to create window");
            }
            if window.state.inner.is_some() {
                let size = window.inner_size()?;
                log::info!("Window: {}x{} ({})", size.width, size.height, config.title);
                return Ok(window);
            }
        }

        bail!("Window was not created after {} event pumps", STARTUP_PUMPS)
    }

    /// Gets a reference to the winit window object.
    ///
    /// # Errors
    ///
    /// - [`WindowError::NotInitialized`]
    pub fn window(&self) -> Result<&WinitWindow, WindowError> {
        self.state.inner.as_ref().ok_or(WindowError::NotInitialized)
    }

    /// Client area size in physical pixels
    pub fn inner_size(&self) -> Result<PhysicalSize<u32>, WindowError> {
        Ok(self.window()?.inner_size())
    }

    fn pump(&mut self) -> PumpStatus {
        self.event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state)
    }
}

impl EventPump for PlatformWindow {
    fn poll_events(&mut self) {
        if let PumpStatus::Exit(code) = self.pump() {
            log::info!("Event loop exited with code {}", code);
            self.state.close_requested = true;
        }
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }
}

impl HasWindowHandle for PlatformWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.window()
            .map_err(|_| HandleError::Unavailable)?
            .window_handle()
    }
}

impl HasDisplayHandle for PlatformWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.window()
            .map_err(|_| HandleError::Unavailable)?
            .display_handle()
    }
}
