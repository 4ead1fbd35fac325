//! Model, view and projection matrices.
//!
//! Rotations are Euler angles in degrees, applied about X, then Y, then Z on
//! the accumulated matrix, counter-clockwise when looking down the axis
//! towards the origin (right-handed).
//!
//! The model and view matrices compose in opposite orders on purpose: an
//! entity is scaled, rotated and then moved into place, while the camera moves
//! the world by its negated position first and rotates it afterwards.

use cgmath::{Deg, Matrix4, Vector3};

/// Maps OpenGL clip space depth (-1..1) onto wgpu's (0..1).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

fn rotation(rotation: Vector3<f32>) -> Matrix4<f32> {
    Matrix4::from_angle_x(Deg(rotation.x))
        * Matrix4::from_angle_y(Deg(rotation.y))
        * Matrix4::from_angle_z(Deg(rotation.z))
}

/// `translate * rotate_x * rotate_y * rotate_z * scale`
pub fn transformation_matrix(
    position: Vector3<f32>,
    rotation_degrees: Vector3<f32>,
    scale: Vector3<f32>,
) -> Matrix4<f32> {
    Matrix4::from_translation(position)
        * rotation(rotation_degrees)
        * Matrix4::from_nonuniform_scale(scale.x, scale.y, scale.z)
}

/// `rotate_x * rotate_y * rotate_z * translate(-position)`
pub fn view_matrix(position: Vector3<f32>, rotation_degrees: Vector3<f32>) -> Matrix4<f32> {
    rotation(rotation_degrees) * Matrix4::from_translation(-position)
}

/// Right-handed perspective projection with wgpu's depth range.
pub fn projection_matrix(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Matrix4<f32> {
    OPENGL_TO_WGPU_MATRIX * cgmath::perspective(Deg(fov_y_degrees), aspect, near, far)
}

#[cfg(test)]
mod tests {
    use cgmath::{Vector4, vec3};

    use super::*;

    fn assert_close(actual: Vector4<f32>, expected: Vector4<f32>) {
        let diff = actual - expected;
        assert!(
            diff.x.abs() < 1e-5 && diff.y.abs() < 1e-5 && diff.z.abs() < 1e-5 && diff.w.abs() < 1e-5,
            "{actual:?} != {expected:?}"
        );
    }

    #[test]
    fn transformation_rotates_counter_clockwise_about_x() {
        let m = transformation_matrix(vec3(1.0, 2.0, 3.0), vec3(90.0, 0.0, 0.0), vec3(1.0, 1.0, 1.0));
        assert_close(m * Vector4::new(0.0, 1.0, 0.0, 1.0), Vector4::new(1.0, 2.0, 4.0, 1.0));

        let m = transformation_matrix(vec3(1.0, 2.0, 3.0), vec3(-90.0, 0.0, 0.0), vec3(1.0, 1.0, 1.0));
        assert_close(m * Vector4::new(0.0, 1.0, 0.0, 1.0), Vector4::new(1.0, 2.0, 2.0, 1.0));
    }

    #[test]
    fn transformation_scales_before_rotating_and_translating() {
        let m = transformation_matrix(vec3(10.0, 0.0, 0.0), vec3(0.0, 0.0, 90.0), vec3(2.0, 1.0, 1.0));
        // (1,0,0) -> scaled (2,0,0) -> rotated about Z (0,2,0) -> moved (10,2,0)
        assert_close(m * Vector4::new(1.0, 0.0, 0.0, 1.0), Vector4::new(10.0, 2.0, 0.0, 1.0));
    }

    #[test]
    fn x_rotation_applies_after_y_rotation() {
        let m = transformation_matrix(vec3(0.0, 0.0, 0.0), vec3(90.0, 90.0, 0.0), vec3(1.0, 1.0, 1.0));
        // Y rotation takes (1,0,0) to (0,0,-1), X rotation then takes it to (0,1,0).
        assert_close(m * Vector4::new(1.0, 0.0, 0.0, 1.0), Vector4::new(0.0, 1.0, 0.0, 1.0));
    }

    #[test]
    fn view_moves_the_world_opposite_to_the_camera() {
        let m = view_matrix(vec3(0.0, 0.0, 5.0), vec3(0.0, 0.0, 0.0));
        assert_close(m * Vector4::new(0.0, 0.0, 0.0, 1.0), Vector4::new(0.0, 0.0, -5.0, 1.0));
    }

    #[test]
    fn view_translates_before_rotating() {
        let m = view_matrix(vec3(0.0, 0.0, 5.0), vec3(0.0, 90.0, 0.0));
        // The origin sits at (0,0,-5) relative to the camera, then the yaw turns it to (-5,0,0).
        assert_close(m * Vector4::new(0.0, 0.0, 0.0, 1.0), Vector4::new(-5.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn projection_maps_near_and_far_to_zero_and_one() {
        let m = projection_matrix(90.0, 1.0, 0.1, 1000.0);
        let near = m * Vector4::new(0.0, 0.0, -0.1, 1.0);
        let far = m * Vector4::new(0.0, 0.0, -1000.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-4);

        // 90 degrees vertical field of view: y == -z lands on the top edge
        let edge = m * Vector4::new(0.0, 1.0, -1.0, 1.0);
        assert!((edge.y / edge.w - 1.0).abs() < 1e-5);
    }
}
