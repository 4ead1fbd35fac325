//! Indexed triangle meshes.
//!
//! A [`Mesh`] owns one vertex array with a `u32` index buffer and up to three
//! attribute buffers, plus an optional texture. Attribute slots are fixed:
//!
//! | slot | attribute           | floats per vertex |
//! |------|---------------------|-------------------|
//! | 0    | position            | 3                 |
//! | 1    | texture coordinates | 2                 |
//! | 2    | normal              | 3                 |

use log::trace;

use crate::{
    context::GraphicsContext,
    data_structures::texture::Texture,
    device::{Device, VertexArrayId},
    shader::ShaderProgram,
};

pub const POSITION_SLOT: u32 = 0;
pub const TEXTURE_COORDS_SLOT: u32 = 1;
pub const NORMAL_SLOT: u32 = 2;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("{len} position floats do not make whole vertices")]
    PartialVertex { len: usize },
    #[error("{count} indices do not make whole triangles")]
    PartialTriangle { count: usize },
    #[error("index {index} is out of range for {vertices} vertices")]
    IndexOutOfRange { index: u32, vertices: usize },
    #[error("attribute slot {slot} got {len} floats, {expected} expected")]
    AttributeLength {
        slot: u32,
        len: usize,
        expected: usize,
    },
}

#[derive(Debug)]
pub struct Mesh {
    vertex_array: VertexArrayId,
    vertex_count: usize,
    index_count: u32,
    texture: Option<Texture>,
}

impl Mesh {
    /// Uploads positions (3 floats per vertex) and a triangle list.
    pub fn new<D: Device>(
        ctx: &mut GraphicsContext<D>,
        vertices: &[f32],
        indices: &[u32],
    ) -> Result<Self, GeometryError> {
        if vertices.len() % 3 != 0 {
            return Err(GeometryError::PartialVertex {
                len: vertices.len(),
            });
        }
        if indices.len() % 3 != 0 {
            return Err(GeometryError::PartialTriangle {
                count: indices.len(),
            });
        }
        let vertex_count = vertices.len() / 3;
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(GeometryError::IndexOutOfRange {
                index,
                vertices: vertex_count,
            });
        }

        let vertex_array = ctx.device_mut().create_vertex_array();
        {
            let mut scope = ctx.bind_vertex_array(vertex_array);
            let device = scope.device_mut();
            device.upload_indices(indices);
            device.upload_attribute(POSITION_SLOT, 3, vertices);
        }
        trace!(
            "mesh with {vertex_count} vertices and {} indices uploaded",
            indices.len()
        );
        Ok(Self {
            vertex_array,
            vertex_count,
            index_count: indices.len() as u32,
            texture: None,
        })
    }

    /// Attaches 2 floats per vertex to slot 1.
    pub fn attach_texture_coords<D: Device>(
        &mut self,
        ctx: &mut GraphicsContext<D>,
        coords: &[f32],
    ) -> Result<(), GeometryError> {
        self.attach(ctx, TEXTURE_COORDS_SLOT, 2, coords)
    }

    /// Attaches 3 floats per vertex to slot 2.
    pub fn attach_normals<D: Device>(
        &mut self,
        ctx: &mut GraphicsContext<D>,
        normals: &[f32],
    ) -> Result<(), GeometryError> {
        self.attach(ctx, NORMAL_SLOT, 3, normals)
    }

    /// Attaches the texture coordinates and uses `texture` for every draw.
    pub fn attach_texture<D: Device>(
        &mut self,
        ctx: &mut GraphicsContext<D>,
        texture: Texture,
        coords: &[f32],
    ) -> Result<(), GeometryError> {
        self.attach_texture_coords(ctx, coords)?;
        self.texture = Some(texture);
        Ok(())
    }

    fn attach<D: Device>(
        &mut self,
        ctx: &mut GraphicsContext<D>,
        slot: u32,
        components: u32,
        data: &[f32],
    ) -> Result<(), GeometryError> {
        let expected = self.vertex_count * components as usize;
        if data.len() != expected {
            return Err(GeometryError::AttributeLength {
                slot,
                len: data.len(),
                expected,
            });
        }
        let mut scope = ctx.bind_vertex_array(self.vertex_array);
        scope.device_mut().upload_attribute(slot, components, data);
        Ok(())
    }

    /// Draws with whatever program is current. The vertex array and texture
    /// bindings are restored afterwards.
    pub fn draw<D: Device>(&self, ctx: &mut GraphicsContext<D>) {
        self.draw_prepared(ctx, |_| {});
    }

    /// Binds `shader` around [`Mesh::draw`].
    pub fn draw_with<D: Device>(&self, ctx: &mut GraphicsContext<D>, shader: &ShaderProgram) {
        let mut scope = shader.bind(ctx);
        self.draw(&mut scope);
    }

    /// Binds vertex array and texture, lets `prepare` upload per-draw state and
    /// issues the draw.
    pub(crate) fn draw_prepared<D: Device>(
        &self,
        ctx: &mut GraphicsContext<D>,
        prepare: impl FnOnce(&mut GraphicsContext<D>),
    ) {
        let mut vertex_scope = ctx.bind_vertex_array(self.vertex_array);
        match self.texture {
            Some(texture) => {
                let mut texture_scope = vertex_scope.bind_texture(Some(texture.id()));
                prepare(&mut texture_scope);
                texture_scope.draw_elements(self.index_count);
            }
            None => {
                prepare(&mut vertex_scope);
                vertex_scope.draw_elements(self.index_count);
            }
        }
    }

    pub fn vertex_array(&self) -> VertexArrayId {
        self.vertex_array
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn texture(&self) -> Option<&Texture> {
        self.texture.as_ref()
    }
}
