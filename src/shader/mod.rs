//! Linked shader programs and named uniform uploads.
//!
//! # Key types
//!
//! - [`ShaderProgram`]: a linked vertex + fragment program with the locations
//!   of the three well-known matrices resolved once after linking.
//! - [`ShaderError`]: compile or link failure, carrying the compiler log.

use cgmath::{Matrix4, Vector3};
use log::{debug, error};

use crate::{
    context::{Bound, GraphicsContext},
    device::{Device, ProgramId, ShaderId, ShaderStage, UniformLocation, UniformValue},
};

pub mod reflect;

pub const TRANSFORMATION_MATRIX: &str = "transformationMatrix";
pub const PROJECTION_MATRIX: &str = "projectionMatrix";
pub const VIEW_MATRIX: &str = "viewMatrix";

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("shader program failed to link:\n{log}")]
    Link { log: String },
}

#[derive(Clone, Debug)]
pub struct ShaderProgram {
    program: ProgramId,
    transformation_matrix: Option<UniformLocation>,
    projection_matrix: Option<UniformLocation>,
    view_matrix: Option<UniformLocation>,
}

impl ShaderProgram {
    /// Compiles and links a program from WGSL vertex and fragment sources.
    ///
    /// Failures are logged and returned. The shader objects are released once
    /// the program is linked, or as soon as one of them turns out to be unusable.
    pub fn compile<D: Device>(
        ctx: &mut GraphicsContext<D>,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, ShaderError> {
        let device = ctx.device_mut();
        let vertex = compile_stage(device, ShaderStage::Vertex, vertex_source)?;
        let fragment = match compile_stage(device, ShaderStage::Fragment, fragment_source) {
            Ok(fragment) => fragment,
            Err(e) => {
                device.delete_shader(vertex);
                return Err(e);
            }
        };
        let linked = device.link_program(vertex, fragment);
        device.delete_shader(vertex);
        device.delete_shader(fragment);
        let program = linked.map_err(|log| {
            error!("shader program failed to link:\n{log}");
            ShaderError::Link { log }
        })?;

        let location = |name: &str| ctx.device().uniform_location(program, name);
        let shader = Self {
            program,
            transformation_matrix: location(TRANSFORMATION_MATRIX),
            projection_matrix: location(PROJECTION_MATRIX),
            view_matrix: location(VIEW_MATRIX),
        };
        debug!("shader program {} ready", program.0);
        Ok(shader)
    }

    pub fn id(&self) -> ProgramId {
        self.program
    }

    /// Makes this the current program until the guard is dropped.
    pub fn bind<'a, D: Device>(&self, ctx: &'a mut GraphicsContext<D>) -> Bound<'a, D> {
        ctx.use_program(self.program)
    }

    /// Clears the current program, whichever it is.
    pub fn unbind<D: Device>(&self, ctx: &mut GraphicsContext<D>) {
        ctx.unbind_program();
    }

    /// Resolves `name`, using the cached location for the well-known matrices.
    pub fn uniform_location<D: Device>(
        &self,
        ctx: &GraphicsContext<D>,
        name: &str,
    ) -> Option<UniformLocation> {
        match name {
            TRANSFORMATION_MATRIX => self.transformation_matrix,
            PROJECTION_MATRIX => self.projection_matrix,
            VIEW_MATRIX => self.view_matrix,
            _ => ctx.device().uniform_location(self.program, name),
        }
    }

    pub fn set_uniform_matrix4<D: Device>(
        &self,
        ctx: &mut GraphicsContext<D>,
        name: &str,
        matrix: Matrix4<f32>,
    ) {
        let location = self.uniform_location(ctx, name);
        self.upload(ctx, location, matrix.into());
    }

    pub fn set_uniform_float<D: Device>(
        &self,
        ctx: &mut GraphicsContext<D>,
        name: &str,
        value: f32,
    ) {
        let location = self.uniform_location(ctx, name);
        self.upload(ctx, location, value.into());
    }

    pub fn set_uniform_vec3<D: Device>(
        &self,
        ctx: &mut GraphicsContext<D>,
        name: &str,
        vector: Vector3<f32>,
    ) {
        let location = self.uniform_location(ctx, name);
        self.upload(ctx, location, vector.into());
    }

    pub fn load_transformation_matrix<D: Device>(
        &self,
        ctx: &mut GraphicsContext<D>,
        matrix: Matrix4<f32>,
    ) {
        self.upload(ctx, self.transformation_matrix, matrix.into());
    }

    pub fn load_projection_matrix<D: Device>(
        &self,
        ctx: &mut GraphicsContext<D>,
        matrix: Matrix4<f32>,
    ) {
        self.upload(ctx, self.projection_matrix, matrix.into());
    }

    pub fn load_view_matrix<D: Device>(&self, ctx: &mut GraphicsContext<D>, matrix: Matrix4<f32>) {
        self.upload(ctx, self.view_matrix, matrix.into());
    }

    /// Uploads into this program, binding it for the duration of the call.
    /// A missing location is a no-op.
    fn upload<D: Device>(
        &self,
        ctx: &mut GraphicsContext<D>,
        location: Option<UniformLocation>,
        value: UniformValue,
    ) {
        let Some(location) = location else {
            return;
        };
        let mut scope = self.bind(ctx);
        scope.device_mut().upload_uniform(&location, value);
    }
}

fn compile_stage<D: Device>(
    device: &mut D,
    stage: ShaderStage,
    source: &str,
) -> Result<ShaderId, ShaderError> {
    device.compile_shader(stage, source).map_err(|log| {
        error!("{stage} shader failed to compile:\n{log}");
        ShaderError::Compile { stage, log }
    })
}
