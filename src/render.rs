//! Entity rendering with a fixed projection.
//!
//! # Key types
//!
//! - [`RendererConfig`]: field of view and clip planes.
//! - [`Renderer`]: computes the projection matrix once at creation and draws
//!   entities with the caller's shader.
//!
//! The renderer never binds the shader program itself. A frame looks like:
//!
//! ```ignore
//! ctx.clear_to_black();
//! {
//!     let mut frame = shader.bind(&mut ctx);
//!     shader.load_view_matrix(&mut frame, camera.view_matrix());
//!     for entity in &entities {
//!         renderer.draw(&mut frame, entity, &shader);
//!     }
//! }
//! ctx.present()?;
//! ```

use cgmath::Matrix4;
use log::debug;

use crate::{
    context::GraphicsContext, data_structures::entity::Entity, device::Device, math,
    shader::ShaderProgram,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RendererConfig {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 90.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Renderer {
    projection: Matrix4<f32>,
}

impl Renderer {
    /// Uploads the projection for the surface's current aspect ratio into
    /// `shader`. Later resizes do not update it.
    pub fn new<D: Device>(
        ctx: &mut GraphicsContext<D>,
        shader: &ShaderProgram,
        config: RendererConfig,
    ) -> Self {
        let projection = math::projection_matrix(
            config.fov_y_degrees,
            ctx.aspect_ratio(),
            config.near,
            config.far,
        );
        shader.load_projection_matrix(ctx, projection);
        debug!(
            "projection for {}x{} at {} degrees",
            ctx.width(),
            ctx.height(),
            config.fov_y_degrees
        );
        Self { projection }
    }

    pub fn projection(&self) -> Matrix4<f32> {
        self.projection
    }

    /// Draws `entity` with its transformation matrix loaded into `shader`.
    pub fn draw<D: Device>(
        &self,
        ctx: &mut GraphicsContext<D>,
        entity: &Entity,
        shader: &ShaderProgram,
    ) {
        entity.mesh.draw_prepared(ctx, |ctx| {
            shader.load_transformation_matrix(ctx, entity.transformation_matrix());
        });
    }
}
