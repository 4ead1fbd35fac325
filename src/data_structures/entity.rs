//! A shared mesh placed in the world.

use std::rc::Rc;

use cgmath::{Matrix4, Vector3};

use crate::{data_structures::mesh::Mesh, math};

/// Position, rotation (Euler degrees) and scale of one [`Mesh`] reference.
///
/// Several entities may share the same mesh; the transform is per entity.
#[derive(Clone, Debug)]
pub struct Entity {
    pub mesh: Rc<Mesh>,
    pub position: Vector3<f32>,
    pub rotation: Vector3<f32>,
    pub scale: Vector3<f32>,
}

impl Entity {
    /// An entity at `position` with no rotation and unit scale.
    pub fn new(mesh: Rc<Mesh>, position: Vector3<f32>) -> Self {
        Self::with_transform(
            mesh,
            position,
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 1.0),
        )
    }

    pub fn with_transform(
        mesh: Rc<Mesh>,
        position: Vector3<f32>,
        rotation: Vector3<f32>,
        scale: Vector3<f32>,
    ) -> Self {
        Self {
            mesh,
            position,
            rotation,
            scale,
        }
    }

    pub fn translate(&mut self, dx: f32, dy: f32, dz: f32) {
        self.position += Vector3::new(dx, dy, dz);
    }

    /// Adds to the rotation. Angles are not wrapped.
    pub fn rotate(&mut self, dx: f32, dy: f32, dz: f32) {
        self.rotation += Vector3::new(dx, dy, dz);
    }

    pub fn set_scale(&mut self, x: f32, y: f32, z: f32) {
        self.scale = Vector3::new(x, y, z);
    }

    pub fn transformation_matrix(&self) -> Matrix4<f32> {
        math::transformation_matrix(self.position, self.rotation, self.scale)
    }
}
