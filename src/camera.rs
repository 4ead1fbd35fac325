//! First-person camera driven by key presses and pointer samples.
//!
//! # Key types
//!
//! - [`Camera`]: position, Euler rotation in degrees (x is pitch, y is yaw),
//!   movement speed and the last pointer position it has seen.
//! - [`MoveKey`]: the six movement keys.
//! - [`InputState`]: the latest pointer position, fed from window events by
//!   the caller and handed to [`Camera::update_from_pointer`] once per frame.

use cgmath::{Matrix4, Point2, Vector3, point2};
use winit::{
    event::{ElementState, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

use crate::math;

pub const DEFAULT_SPEED: f32 = 0.16;
pub const DEFAULT_SENSITIVITY: f32 = 1.0;
const MAX_PITCH: f32 = 90.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MoveKey {
    Forward,
    Backward,
    StrafeLeft,
    StrafeRight,
    Up,
    Down,
}

impl MoveKey {
    /// W/S/A/D move in the ground plane, Shift goes up, Control goes down.
    pub fn from_key_code(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::KeyW => Some(MoveKey::Forward),
            KeyCode::KeyS => Some(MoveKey::Backward),
            KeyCode::KeyA => Some(MoveKey::StrafeLeft),
            KeyCode::KeyD => Some(MoveKey::StrafeRight),
            KeyCode::ShiftLeft | KeyCode::ShiftRight => Some(MoveKey::Up),
            KeyCode::ControlLeft | KeyCode::ControlRight => Some(MoveKey::Down),
            _ => None,
        }
    }
}

/// Pointer state sampled from the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputState {
    pointer: Point2<f32>,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            pointer: point2(0.0, 0.0),
        }
    }
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pointer(&self) -> Point2<f32> {
        self.pointer
    }

    pub fn set_pointer(&mut self, x: f32, y: f32) {
        self.pointer = point2(x, y);
    }

    /// Tracks the cursor and translates key presses (repeats included) into
    /// [`MoveKey`]s for [`Camera::on_key`].
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> Option<MoveKey> {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.set_pointer(position.x as f32, position.y as f32);
                None
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                match event.physical_key {
                    PhysicalKey::Code(code) => MoveKey::from_key_code(code),
                    PhysicalKey::Unidentified(_) => None,
                }
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Vector3<f32>,
    /// Degrees; x (pitch) stays within [-90, 90], y (yaw) is unbounded.
    pub rotation: Vector3<f32>,
    /// World units per key press.
    pub speed: f32,
    last_pointer: Point2<f32>,
}

impl Camera {
    pub fn new(position: Vector3<f32>, rotation: Vector3<f32>) -> Self {
        Self {
            position,
            rotation,
            speed: DEFAULT_SPEED,
            last_pointer: point2(0.0, 0.0),
        }
    }

    /// Moves one step of `speed`. Planar moves follow the yaw, vertical ones
    /// are axis aligned.
    pub fn on_key(&mut self, key: MoveKey) {
        let yaw = (-self.rotation.y).to_radians();
        let (sin, cos) = (self.speed * yaw.sin(), self.speed * yaw.cos());
        match key {
            MoveKey::Forward => {
                self.position.z -= cos;
                self.position.x -= sin;
            }
            MoveKey::Backward => {
                self.position.z += cos;
                self.position.x += sin;
            }
            MoveKey::StrafeRight => {
                self.position.x += cos;
                self.position.z -= sin;
            }
            MoveKey::StrafeLeft => {
                self.position.x -= cos;
                self.position.z += sin;
            }
            MoveKey::Up => self.position.y += self.speed,
            MoveKey::Down => self.position.y -= self.speed,
        }
    }

    /// Turns by the pointer movement since the previous call.
    ///
    /// Horizontal movement adds to yaw, vertical movement to pitch, both scaled
    /// by `sensitivity`. Pitch saturates at +-90 degrees. Call once per frame;
    /// the delta is not smoothed, so skipped frames show up as one large turn.
    pub fn update_from_pointer(&mut self, input: &InputState, sensitivity: f32) {
        let delta = (input.pointer() - self.last_pointer) * sensitivity;
        self.rotation.x = (self.rotation.x + delta.y).clamp(-MAX_PITCH, MAX_PITCH);
        self.rotation.y += delta.x;
        self.last_pointer = input.pointer();
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        math::view_matrix(self.position, self.rotation)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.0))
    }
}
