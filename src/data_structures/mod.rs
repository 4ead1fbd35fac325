//! Scene data: meshes, textures, entities and terrain.
//!
//! - `mesh` holds the vertex array, index buffer and attribute buffers of one model
//! - `texture` is an uploaded RGBA8 image
//! - `entity` places a shared mesh in the world
//! - `terrain` generates a jittered grid mesh wrapped in an entity

pub mod entity;
pub mod mesh;
pub mod terrain;
pub mod texture;
