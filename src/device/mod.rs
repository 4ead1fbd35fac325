//! GL-style device abstraction.
//!
//! Everything above this module talks to the GPU through the [`Device`] trait,
//! a small state machine in the spirit of WebGL2: there is a current program,
//! a current vertex array and a current texture, buffers attach to whatever
//! vertex array is bound, uniform uploads target the bound program and
//! `draw_elements` draws the bound vertex array.
//!
//! Two implementations exist:
//!
//! - [`WgpuDevice`] renders through wgpu, either onto a winit window or into an
//!   offscreen texture.
//! - [`Recorder`] is headless. It validates shaders exactly like the wgpu device
//!   does, tracks bindings and uniform values and records every call as a
//!   [`Command`]. Tests use it to observe what the upper layers do.
//!
//! Shader sources are WGSL; see [`crate::shader::reflect`] for the contract
//! between shader sources and vertex attribute slots / uniform names.

use std::fmt;

pub mod gpu;
pub mod recorder;

pub use gpu::WgpuDevice;
pub use recorder::{Command, Recorder};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

handle!(
    /// A compiled, not yet linked shader stage.
    ShaderId
);
handle!(
    /// A linked vertex + fragment program.
    ProgramId
);
handle!(
    /// A set of attribute buffers plus one index buffer.
    VertexArrayId
);
handle!(
    /// An uploaded 2D RGBA8 texture.
    TextureId
);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// The value types a uniform upload can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Vec3,
    Mat4,
    /// Declared in the shader but not uploadable through this API.
    Unsupported,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec3([f32; 3]),
    /// Column-major, like WGSL's `mat4x4<f32>`.
    Mat4([[f32; 4]; 4]),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        match self {
            UniformValue::Float(value) => bytemuck::bytes_of(value).to_vec(),
            UniformValue::Vec3(value) => bytemuck::cast_slice(value).to_vec(),
            UniformValue::Mat4(value) => bytemuck::cast_slice(value).to_vec(),
        }
    }
}

impl From<cgmath::Matrix4<f32>> for UniformValue {
    fn from(matrix: cgmath::Matrix4<f32>) -> Self {
        UniformValue::Mat4(matrix.into())
    }
}

impl From<cgmath::Vector3<f32>> for UniformValue {
    fn from(vector: cgmath::Vector3<f32>) -> Self {
        UniformValue::Vec3(vector.into())
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

/// Where a named uniform lives inside a linked program.
///
/// `block` indexes the program's uniform blocks, `offset` is the byte offset
/// of the member inside that block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformLocation {
    pub(crate) program: ProgramId,
    pub(crate) block: usize,
    pub(crate) offset: u32,
    pub(crate) kind: UniformKind,
}

impl UniformLocation {
    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn kind(&self) -> UniformKind {
        self.kind
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("the drawing surface is unavailable: {0}")]
    Surface(String),
}

/// Byte length of a tightly packed RGBA8 image, `None` if it does not fit in
/// `usize`.
pub(crate) fn rgba8_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(4)
}

/// The GL-style state machine.
///
/// Calls that GL would reject with an error flag (uploads without a bound
/// program, buffers without a bound vertex array, ...) are logged and ignored.
pub trait Device {
    /// Size of the host's drawable area, in physical pixels.
    fn viewport_size(&self) -> (u32, u32);

    /// (Re)configures the drawing surface.
    fn resize(&mut self, width: u32, height: u32);

    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32);

    fn enable_depth_test(&mut self);

    /// Clears colour and depth of the current frame.
    fn clear(&mut self, colour: [f32; 4]);

    /// Finishes the current frame.
    fn present(&mut self) -> Result<(), DeviceError>;

    /// Compiles one stage. The error carries the compiler log.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String>;

    /// Links two compiled stages. The error carries the linker log.
    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId, String>;

    fn delete_shader(&mut self, shader: ShaderId);

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    fn use_program(&mut self, program: Option<ProgramId>);

    /// Uploads into the currently bound program.
    fn upload_uniform(&mut self, location: &UniformLocation, value: UniformValue);

    fn create_vertex_array(&mut self) -> VertexArrayId;

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>);

    /// Attaches a `u32` index buffer to the bound vertex array.
    fn upload_indices(&mut self, indices: &[u32]);

    /// Attaches a float attribute buffer to `slot` of the bound vertex array.
    fn upload_attribute(&mut self, slot: u32, components: u32, data: &[f32]);

    /// Uploads an RGBA8 image, sampled with linear filtering and repeat wrapping.
    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> TextureId;

    /// Binds `texture` to texture unit 0.
    fn bind_texture(&mut self, texture: Option<TextureId>);

    /// Draws `count` indices of the bound vertex array as a triangle list.
    fn draw_elements(&mut self, count: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba8_len_counts_four_bytes_per_pixel() {
        assert_eq!(rgba8_len(3, 2), Some(24));
        assert_eq!(rgba8_len(0, 9), Some(0));
    }

    #[test]
    fn rgba8_len_of_huge_images_does_not_wrap() {
        assert_eq!(rgba8_len(u32::MAX, u32::MAX), None);
        assert_eq!(rgba8_len(1, u32::MAX), (u32::MAX as usize).checked_mul(4));
    }
}
