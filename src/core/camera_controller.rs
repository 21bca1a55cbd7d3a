//! Fly camera controller driven by winit key and mouse events

use std::collections::HashSet;
use winit::keyboard::KeyCode;

use crate::core::camera::Camera;
use crate::core::types::Vec3;

/// Free-flight controller with WASD movement and mouse look.
///
/// Keys are fed in as they arrive from the event loop; movement is applied
/// once per frame in [`FlyController::update`].
pub struct FlyController {
    /// Movement speed in world units per second
    pub speed: f32,
    /// Radians of rotation per pixel of mouse motion
    pub sensitivity: f32,
    /// Speed multiplier while Control is held
    pub sprint_multiplier: f32,
    yaw: f32,
    pitch: f32,
    held: HashSet<KeyCode>,
    mouse_delta: (f32, f32),
    mouse_captured: bool,
}

impl FlyController {
    pub fn new(speed: f32, sensitivity: f32) -> Self {
        Self {
            speed,
            sensitivity,
            sprint_multiplier: 3.0,
            yaw: 0.0,
            pitch: 0.0,
            held: HashSet::new(),
            mouse_delta: (0.0, 0.0),
            mouse_captured: false,
        }
    }

    /// Adopt the orientation of `camera` so the first update does not snap
    pub fn sync_with(&mut self, camera: &Camera) {
        let (yaw, pitch) = camera.euler_angles();
        self.yaw = yaw;
        self.pitch = pitch.clamp(-1.5, 1.5);
    }

    pub fn key(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.held.insert(key);
        } else {
            self.held.remove(&key);
        }
    }

    /// Raw mouse motion; ignored unless the cursor is captured
    pub fn mouse_motion(&mut self, delta: (f64, f64)) {
        if self.mouse_captured {
            self.mouse_delta.0 += delta.0 as f32;
            self.mouse_delta.1 += delta.1 as f32;
        }
    }

    pub fn set_mouse_captured(&mut self, captured: bool) {
        self.mouse_captured = captured;
        self.mouse_delta = (0.0, 0.0);
    }

    pub fn is_mouse_captured(&self) -> bool {
        self.mouse_captured
    }

    /// Forget held keys, e.g. when the window loses focus
    pub fn release_all(&mut self) {
        self.held.clear();
    }

    /// Apply accumulated input to the camera. Returns true if the camera moved.
    pub fn update(&mut self, camera: &mut Camera, dt: f32) -> bool {
        let mut moved = false;

        let (dx, dy) = std::mem::take(&mut self.mouse_delta);
        if dx != 0.0 || dy != 0.0 {
            self.yaw -= dx * self.sensitivity;
            self.pitch = (self.pitch - dy * self.sensitivity).clamp(-1.5, 1.5);
            camera.set_rotation_euler(self.yaw, self.pitch);
            moved = true;
        }

        let mut velocity = Vec3::ZERO;
        let bindings = [
            (KeyCode::KeyW, camera.forward()),
            (KeyCode::KeyS, -camera.forward()),
            (KeyCode::KeyD, camera.right()),
            (KeyCode::KeyA, -camera.right()),
            (KeyCode::Space, Vec3::Y),
            (KeyCode::ShiftLeft, -Vec3::Y),
        ];
        for (key, direction) in bindings {
            if self.held.contains(&key) {
                velocity += direction;
            }
        }

        if velocity.length_squared() > 0.0 {
            let mut speed = self.speed;
            if self.held.contains(&KeyCode::ControlLeft) {
                speed *= self.sprint_multiplier;
            }
            camera.position += velocity.normalize() * speed * dt;
            moved = true;
        }

        moved
    }
}

impl Default for FlyController {
    fn default() -> Self {
        Self::new(1.0, 0.002)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_key_moves_along_view() {
        let mut controller = FlyController::new(2.0, 0.002);
        let mut camera = Camera::default();
        let start = camera.position;

        controller.key(KeyCode::KeyW, true);
        assert!(controller.update(&mut camera, 0.5));
        assert!((camera.position - (start + camera.forward())).length() < 1e-4);

        controller.key(KeyCode::KeyW, false);
        assert!(!controller.update(&mut camera, 0.5));
    }

    #[test]
    fn test_mouse_ignored_until_captured() {
        let mut controller = FlyController::default();
        let mut camera = Camera::default();

        controller.mouse_motion((100.0, 0.0));
        assert!(!controller.update(&mut camera, 0.016));

        controller.set_mouse_captured(true);
        controller.mouse_motion((100.0, 0.0));
        assert!(controller.update(&mut camera, 0.016));
        // moving the mouse right turns toward +X
        assert!(camera.forward().x > 0.0);
    }
}
