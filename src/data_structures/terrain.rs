//! Procedurally generated terrain.
//!
//! # Key types
//!
//! - [`TerrainGrid`]: CPU-side arrays of a `vertex_count` x `vertex_count`
//!   grid spanning `size` world units on the X/Z plane. Heights are sampled
//!   independently from [0, 5), normals all point up and texture coordinates
//!   span [0, 1] once across the grid.
//! - [`Terrain`]: the uploaded grid as one [`Entity`], centred on the origin on
//!   X/Z and lowered by 10 units.

use std::rc::Rc;

use cgmath::Vector3;
use rand::Rng;

use crate::{
    context::GraphicsContext,
    data_structures::{
        entity::Entity,
        mesh::{GeometryError, Mesh},
        texture::Texture,
    },
    device::Device,
};

pub const MAX_HEIGHT: f32 = 5.0;
pub const BASE_HEIGHT: f32 = -10.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainConfig {
    /// Edge length in world units.
    pub size: f32,
    /// Vertices per edge.
    pub vertex_count: u32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            size: 800.0,
            vertex_count: 128,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TerrainGrid {
    pub size: f32,
    pub vertex_count: u32,
    pub vertices: Vec<f32>,
    pub normals: Vec<f32>,
    pub texture_coords: Vec<f32>,
    pub indices: Vec<u32>,
}

/// Six indices per cell of a `vertex_count` x `vertex_count` grid.
fn index_count(vertex_count: u32) -> usize {
    let cells = vertex_count.saturating_sub(1) as usize;
    cells * cells * 6
}

impl TerrainGrid {
    pub fn generate<R: Rng + ?Sized>(size: f32, vertex_count: u32, rng: &mut R) -> Self {
        let n = vertex_count as usize;
        let last = vertex_count.saturating_sub(1).max(1) as f32;
        let mut vertices = Vec::with_capacity(n * n * 3);
        let mut normals = Vec::with_capacity(n * n * 3);
        let mut texture_coords = Vec::with_capacity(n * n * 2);
        for i in 0..vertex_count {
            for j in 0..vertex_count {
                let (u, v) = (j as f32 / last, i as f32 / last);
                vertices.extend_from_slice(&[u * size, rng.gen_range(0.0..MAX_HEIGHT), v * size]);
                normals.extend_from_slice(&[0.0, 1.0, 0.0]);
                texture_coords.extend_from_slice(&[u, v]);
            }
        }

        let cells = vertex_count.saturating_sub(1);
        let mut indices = Vec::with_capacity(index_count(vertex_count));
        for gz in 0..cells {
            for gx in 0..cells {
                let top_left = gz * vertex_count + gx;
                let top_right = top_left + 1;
                let bottom_left = (gz + 1) * vertex_count + gx;
                let bottom_right = bottom_left + 1;
                indices.extend_from_slice(&[
                    top_left,
                    bottom_left,
                    bottom_right,
                    bottom_right,
                    top_right,
                    top_left,
                ]);
            }
        }

        Self {
            size,
            vertex_count,
            vertices,
            normals,
            texture_coords,
            indices,
        }
    }
}

#[derive(Debug)]
pub struct Terrain {
    pub entity: Entity,
}

impl Terrain {
    /// Uploads `grid`. With a texture the texture coordinates are attached too.
    pub fn new<D: Device>(
        ctx: &mut GraphicsContext<D>,
        grid: &TerrainGrid,
        texture: Option<Texture>,
    ) -> Result<Self, GeometryError> {
        let mut mesh = Mesh::new(ctx, &grid.vertices, &grid.indices)?;
        if let Some(texture) = texture {
            mesh.attach_texture(ctx, texture, &grid.texture_coords)?;
        }
        mesh.attach_normals(ctx, &grid.normals)?;
        let half = grid.size / 2.0;
        let entity = Entity::new(Rc::new(mesh), Vector3::new(-half, BASE_HEIGHT, -half));
        Ok(Self { entity })
    }

    /// Generates and uploads a grid with heights from the thread RNG.
    pub fn generate<D: Device>(
        ctx: &mut GraphicsContext<D>,
        config: TerrainConfig,
        texture: Option<Texture>,
    ) -> Result<Self, GeometryError> {
        let grid = TerrainGrid::generate(config.size, config.vertex_count, &mut rand::thread_rng());
        Self::new(ctx, &grid, texture)
    }
}
