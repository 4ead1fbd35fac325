//! simple-gl
//!
//! A small GL-style rendering layer: compile a shader, upload a mesh, place
//! entities, move a camera and draw, on native targets and on the web. It
//! packages the recurring pieces of a WebGL tutorial series behind an explicit
//! [`context::GraphicsContext`] instead of implicit global bindings.
//!
//! High-level modules
//! - `device`: the GL-style device trait, its wgpu implementation and a
//!   recording implementation for tests
//! - `context`: surface size, device and scoped bindings
//! - `shader`: shader programs, uniform uploads and WGSL reflection
//! - `data_structures`: meshes, textures, entities and terrain
//! - `math`: model, view and projection matrices
//! - `camera`: first-person camera and pointer input state
//! - `render`: fixed-projection entity renderer
//!

pub mod camera;
pub mod context;
pub mod data_structures;
pub mod device;
pub mod math;
pub mod render;
pub mod shader;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use context::{Bound, GraphicsContext};
pub use device::{Device, Recorder, WgpuDevice};
pub use winit::event::WindowEvent;

/// Installs a logger: `env_logger` natively, the browser console on wasm.
///
/// Calling it more than once is harmless.
pub fn init_logger() {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            log::debug!("logger already initialized: {e}");
        }
    }

    #[cfg(target_arch = "wasm32")]
    {
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            log::debug!("logger already initialized: {e}");
        }
    }
}
