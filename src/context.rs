//! The explicit graphics context.
//!
//! # Key types
//!
//! - [`GraphicsContext`]: surface dimensions, the [`Device`] and the current
//!   program / vertex array / texture bindings. Every rendering operation takes
//!   it by reference.
//! - [`Bound`]: a scoped binding. It derefs to the context, so further bindings
//!   and draws can be issued through it, and it restores the binding it replaced
//!   when dropped.
//!
//! ```ignore
//! let mut shader_scope = shader.bind(&mut ctx);
//! shader.load_view_matrix(&mut shader_scope, camera.view_matrix());
//! renderer.draw(&mut shader_scope, &entity, &shader);
//! // program binding restored here
//! ```

use std::ops::{Deref, DerefMut};

use log::debug;

use crate::device::{
    Command, Device, DeviceError, ProgramId, Recorder, TextureId, VertexArrayId, WgpuDevice,
};

/// The bindings a [`GraphicsContext`] currently has in effect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bindings {
    pub program: Option<ProgramId>,
    pub vertex_array: Option<VertexArrayId>,
    pub texture: Option<TextureId>,
}

#[derive(Clone, Copy, Debug)]
enum Binding {
    Program(Option<ProgramId>),
    VertexArray(Option<VertexArrayId>),
    Texture(Option<TextureId>),
}

/// The device is only handed out read-only, so bindings cannot change behind
/// the context's back:
///
/// ```compile_fail
/// use simple_gl::{GraphicsContext, Recorder, device::Device};
///
/// let mut ctx = GraphicsContext::create_surface(Recorder::new(4, 4), 4, 4);
/// ctx.device_mut().use_program(None);
/// ```
#[derive(Debug)]
pub struct GraphicsContext<D: Device> {
    device: D,
    width: u32,
    height: u32,
    bindings: Bindings,
}

impl<D: Device> GraphicsContext<D> {
    /// Allocates a drawing surface of `width` x `height` pixels on `device`.
    pub fn create_surface(mut device: D, width: u32, height: u32) -> Self {
        device.resize(width, height);
        debug!("surface created ({width}x{height})");
        Self {
            device,
            width,
            height,
            bindings: Bindings::default(),
        }
    }

    /// Adopts the host's current drawable size.
    pub fn resize_to_fit(&mut self) {
        let (width, height) = self.device.viewport_size();
        if (width, height) != (self.width, self.height) {
            self.width = width;
            self.height = height;
            self.device.resize(width, height);
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Width over height; 1.0 for a degenerate surface.
    pub fn aspect_ratio(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }

    /// Sets the viewport to the full surface, enables depth testing and clears
    /// colour and depth.
    pub fn clear(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.device.set_viewport(0, 0, self.width, self.height);
        self.device.enable_depth_test();
        self.device.clear([r, g, b, a]);
    }

    pub fn clear_to_black(&mut self) {
        self.clear(0.0, 0.0, 0.0, 1.0);
    }

    /// Finishes the frame.
    pub fn present(&mut self) -> Result<(), DeviceError> {
        self.device.present()
    }

    pub fn bindings(&self) -> Bindings {
        self.bindings
    }

    pub fn current_program(&self) -> Option<ProgramId> {
        self.bindings.program
    }

    pub fn use_program(&mut self, program: ProgramId) -> Bound<'_, D> {
        self.bind(Binding::Program(Some(program)))
    }

    /// Clears the current program without restoring it later.
    pub fn unbind_program(&mut self) {
        self.apply(Binding::Program(None));
    }

    pub fn bind_vertex_array(&mut self, vertex_array: VertexArrayId) -> Bound<'_, D> {
        self.bind(Binding::VertexArray(Some(vertex_array)))
    }

    /// Binds `texture` to unit 0. `None` unbinds for the scope of the guard.
    pub fn bind_texture(&mut self, texture: Option<TextureId>) -> Bound<'_, D> {
        self.bind(Binding::Texture(texture))
    }

    /// Draws `count` indices of the bound vertex array. Zero draws nothing.
    pub fn draw_elements(&mut self, count: u32) {
        if count == 0 {
            return;
        }
        self.device.draw_elements(count);
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Bindings must only change through [`GraphicsContext::bind`], or the
    /// cached state stops matching the device.
    pub(crate) fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    fn bind(&mut self, binding: Binding) -> Bound<'_, D> {
        let restore = self.apply(binding);
        Bound { ctx: self, restore }
    }

    /// Puts `binding` in effect and returns the binding it replaced.
    fn apply(&mut self, binding: Binding) -> Binding {
        match binding {
            Binding::Program(program) => {
                let previous = self.bindings.program;
                if previous != program {
                    self.bindings.program = program;
                    self.device.use_program(program);
                }
                Binding::Program(previous)
            }
            Binding::VertexArray(vertex_array) => {
                let previous = self.bindings.vertex_array;
                if previous != vertex_array {
                    self.bindings.vertex_array = vertex_array;
                    self.device.bind_vertex_array(vertex_array);
                }
                Binding::VertexArray(previous)
            }
            Binding::Texture(texture) => {
                let previous = self.bindings.texture;
                if previous != texture {
                    self.bindings.texture = texture;
                    self.device.bind_texture(texture);
                }
                Binding::Texture(previous)
            }
        }
    }
}

impl GraphicsContext<Recorder> {
    /// Returns and forgets everything the recorder saw so far.
    pub fn take_commands(&mut self) -> Vec<Command> {
        self.device.take_commands()
    }

    /// Simulates the host changing size; see [`GraphicsContext::resize_to_fit`].
    pub fn set_host_size(&mut self, width: u32, height: u32) {
        self.device.set_host_size(width, height);
    }
}

impl GraphicsContext<WgpuDevice> {
    /// Finishes pending draws and reads back an offscreen surface.
    pub async fn read_pixels(&mut self) -> anyhow::Result<image::RgbaImage> {
        self.device.read_pixels().await
    }
}

/// A binding held for the lifetime of the guard.
#[must_use]
pub struct Bound<'a, D: Device> {
    ctx: &'a mut GraphicsContext<D>,
    restore: Binding,
}

impl<D: Device> Deref for Bound<'_, D> {
    type Target = GraphicsContext<D>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl<D: Device> DerefMut for Bound<'_, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl<D: Device> Drop for Bound<'_, D> {
    fn drop(&mut self) {
        self.ctx.apply(self.restore);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> GraphicsContext<Recorder> {
        GraphicsContext::create_surface(Recorder::new(640, 480), 320, 240)
    }

    #[test]
    fn create_surface_sizes_the_device() {
        let ctx = ctx();
        assert_eq!((ctx.width(), ctx.height()), (320, 240));
        assert_eq!(
            ctx.device().commands(),
            &[Command::Resize {
                width: 320,
                height: 240
            }]
        );
        assert!((ctx.aspect_ratio() - 4.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn resize_to_fit_adopts_the_host_size() {
        let mut ctx = ctx();
        ctx.resize_to_fit();
        assert_eq!((ctx.width(), ctx.height()), (640, 480));

        ctx.take_commands();
        ctx.resize_to_fit();
        assert!(ctx.device().commands().is_empty());
    }

    #[test]
    fn clear_sets_viewport_and_depth_test() {
        let mut ctx = ctx();
        ctx.take_commands();
        ctx.clear_to_black();
        assert_eq!(
            ctx.device().commands(),
            &[
                Command::Viewport {
                    x: 0,
                    y: 0,
                    width: 320,
                    height: 240
                },
                Command::EnableDepthTest,
                Command::Clear([0.0, 0.0, 0.0, 1.0]),
            ]
        );
    }

    #[test]
    fn guards_restore_the_previous_binding() {
        let mut ctx = ctx();
        let outer = VertexArrayId(1);
        let inner = VertexArrayId(2);
        {
            let mut scope = ctx.bind_vertex_array(outer);
            {
                let scope = scope.bind_vertex_array(inner);
                assert_eq!(scope.bindings().vertex_array, Some(inner));
            }
            assert_eq!(scope.bindings().vertex_array, Some(outer));
        }
        assert_eq!(ctx.bindings(), Bindings::default());
        assert_eq!(ctx.device().current_vertex_array(), None);
    }

    #[test]
    fn rebinding_the_same_texture_issues_no_device_call() {
        let mut ctx = ctx();
        let texture = TextureId(0);
        let mut scope = ctx.bind_texture(Some(texture));
        scope.take_commands();
        {
            let _again = scope.bind_texture(Some(texture));
        }
        assert!(scope.device().commands().is_empty());
    }

    #[test]
    fn unbind_without_bind_only_clears_the_program() {
        let mut ctx = ctx();
        ctx.unbind_program();
        assert_eq!(ctx.bindings(), Bindings::default());
    }

    #[test]
    fn device_follows_the_cached_bindings_through_nested_scopes() {
        let mut ctx = ctx();
        let program = ProgramId(0);
        let vertex_array = VertexArrayId(0);
        let texture = TextureId(0);
        {
            let mut frame = ctx.use_program(program);
            for _ in 0..2 {
                let mut mesh = frame.bind_vertex_array(vertex_array);
                let mut textured = mesh.bind_texture(Some(texture));
                let again = textured.use_program(program);
                let recorder = again.device();
                assert_eq!(recorder.current_program(), again.bindings().program);
                assert_eq!(recorder.current_vertex_array(), Some(vertex_array));
                assert_eq!(recorder.current_texture(), Some(texture));
            }
            assert_eq!(frame.device().current_program(), Some(program));
            assert_eq!(frame.device().current_vertex_array(), None);
        }
        let recorder = ctx.device();
        assert_eq!(
            (
                recorder.current_program(),
                recorder.current_vertex_array(),
                recorder.current_texture()
            ),
            (None, None, None)
        );
    }

    #[test]
    fn recorder_accessors_forward_to_the_device() {
        let mut ctx = ctx();
        assert_eq!(ctx.take_commands().len(), 1);
        ctx.set_host_size(100, 800);
        ctx.resize_to_fit();
        assert_eq!((ctx.width(), ctx.height()), (100, 800));
        assert_eq!(
            ctx.take_commands(),
            vec![Command::Resize {
                width: 100,
                height: 800
            }]
        );
    }

    #[test]
    fn zero_count_draw_reaches_no_device() {
        let mut ctx = ctx();
        ctx.take_commands();
        ctx.draw_elements(0);
        assert!(ctx.device().commands().is_empty());
    }
}
