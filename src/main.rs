// =============================================================================
// VULKAN SHADER TOY - Minimal Vulkan bootstrap
// =============================================================================
//
// Opens a fixed-size window, brings up a Vulkan context step by step, builds
// one graphics pipeline from two SPIR-V shaders and presents a full-screen
// shader every frame until the window is closed.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  PlatformWindow (winit, pumped once per frame)                  │
// │    └── Renderer                                                 │
// │          └── Instance -> Surface -> Device -> Swapchain         │
// │                └── RenderPass + Pipeline + Framebuffers         │
// │                      └── Command buffers + fences/semaphores    │
// └─────────────────────────────────────────────────────────────────┘
//
// Any initialization failure aborts the run: it is logged, printed to
// stdout, and the process exits normally.
//
// =============================================================================

mod backend;
mod config;
mod frame_loop;
mod platform;
mod renderer;

use anyhow::{Context, Result};
use ash::vk;
use config::Config;
use platform::PlatformWindow;
use renderer::Renderer;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() {
    init_logging();

    let config = Config::load();
    log::info!("Starting Vulkan shader toy");
    log::info!("Present mode: {}", config.graphics.present_mode);

    if let Err(e) = run(&config) {
        log::error!("{:#}", e);
        println!("{:#}", e);
    }
}

/// Initialize logging, `RUST_LOG` overrides the default level
fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn run(config: &Config) -> Result<()> {
    let mut window = PlatformWindow::new(&config.window)?;

    let size = window.inner_size()?;
    let extent = vk::Extent2D {
        width: size.width,
        height: size.height,
    };

    // Declared after the window so it drops first: the surface must go
    // before the native window it was made from
    let mut renderer =
        Renderer::new(&window, extent, config).context("Vulkan initialization failed")?;

    frame_loop::run(&mut window, &mut renderer).context("Frame loop failed")?;

    log::info!("Shutting down");
    Ok(())
}
