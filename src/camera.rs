use std::cell::Cell;

use glam::{Mat4, Vec2, Vec3};

/// Dolly floor; the view matrix degenerates as the eye reaches the target.
const MIN_DISTANCE: f32 = 0.5;
/// Orbit distance change per dolly step.
const DOLLY_STEP: f32 = 1.0;
/// Radians of yaw/pitch per pixel of pointer drag.
const ROTATE_SENSITIVITY: f32 = 0.005;
/// Keep the pitch shy of the poles so the up vector stays valid.
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Orbit camera around the origin driven by pointer drags and dolly keys.
///
/// The camera has a single steady state; a pointer press enters a transient
/// drag capture that converts pointer deltas into yaw/pitch until release.
#[derive(Debug)]
pub struct Camera {
    yaw: f32,
    pitch: f32,
    distance: f32,
    fov_y: f32,
    near: f32,
    far: f32,
    drag_origin: Option<Vec2>,
    cached_view: Cell<Option<Mat4>>,
}

impl Camera {
    pub fn new(yaw: f32, pitch: f32, distance: f32) -> Self {
        Self {
            yaw,
            pitch: pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT),
            distance: distance.max(MIN_DISTANCE),
            fov_y: 45f32.to_radians(),
            near: 0.1,
            far: 100.0,
            drag_origin: None,
            cached_view: Cell::new(None),
        }
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_origin.is_some()
    }

    /// World-space eye position derived from the orbit parameters.
    pub fn position(&self) -> Vec3 {
        Vec3::new(
            self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.cos() * self.pitch.cos(),
        ) * self.distance
    }

    pub fn on_pointer_down(&mut self, position: Vec2) {
        self.drag_origin = Some(position);
    }

    pub fn on_pointer_move(&mut self, position: Vec2) {
        let Some(origin) = self.drag_origin else {
            return;
        };
        let delta = position - origin;
        self.yaw += delta.x * ROTATE_SENSITIVITY;
        self.pitch = (self.pitch + delta.y * ROTATE_SENSITIVITY).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.drag_origin = Some(position);
        self.cached_view.set(None);
    }

    pub fn on_pointer_up(&mut self) {
        self.drag_origin = None;
    }

    /// Moves the eye along the view ray by whole dolly steps.
    ///
    /// Negative steps zoom in; the distance is clamped at the floor instead
    /// of ever reaching zero.
    pub fn dolly(&mut self, steps: f32) {
        self.distance = (self.distance + steps * DOLLY_STEP).max(MIN_DISTANCE);
        self.cached_view.set(None);
    }

    /// Look-at view matrix, cached until the orbit state changes.
    pub fn view(&self) -> Mat4 {
        if let Some(view) = self.cached_view.get() {
            return view;
        }
        let view = Mat4::look_at_rh(self.position(), Vec3::ZERO, Vec3::Y);
        self.cached_view.set(Some(view));
        view
    }

    /// Perspective matrix; recomputed each call since the aspect ratio
    /// follows the window, not the camera.
    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect.max(0.01), self.near, self.far)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(0.0, 0.0, 30.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dolly_never_breaches_the_floor() {
        let mut camera = Camera::new(0.0, 0.0, 5.0);
        for _ in 0..100 {
            camera.dolly(-1.0);
        }
        assert!(camera.distance() >= MIN_DISTANCE);
        camera.dolly(3.0);
        assert!((camera.distance() - (MIN_DISTANCE + 3.0 * DOLLY_STEP)).abs() < 1e-6);
    }

    #[test]
    fn pointer_moves_only_rotate_while_dragging() {
        let mut camera = Camera::default();
        let before = camera.view();
        camera.on_pointer_move(Vec2::new(100.0, 0.0));
        assert!(!camera.is_dragging());
        assert_eq!(camera.view(), before);

        camera.on_pointer_down(Vec2::new(10.0, 10.0));
        assert!(camera.is_dragging());
        camera.on_pointer_move(Vec2::new(110.0, 10.0));
        assert_ne!(camera.view(), before);

        camera.on_pointer_up();
        assert!(!camera.is_dragging());
        let settled = camera.view();
        camera.on_pointer_move(Vec2::new(0.0, 0.0));
        assert_eq!(camera.view(), settled);
    }

    #[test]
    fn pitch_is_clamped_at_the_poles() {
        let mut camera = Camera::default();
        camera.on_pointer_down(Vec2::ZERO);
        camera.on_pointer_move(Vec2::new(0.0, 1e6));
        let eye = camera.position();
        assert!(eye.x.abs() < 1.0 && eye.z.abs() < 1.0);
        assert!(eye.y < camera.distance());
    }

    #[test]
    fn default_camera_looks_down_negative_z() {
        let camera = Camera::default();
        assert!((camera.position() - Vec3::new(0.0, 0.0, 30.0)).length() < 1e-4);
        let clip = camera.projection(1.0) * camera.view() * Vec3::ZERO.extend(1.0);
        // The origin projects to the center of the screen.
        assert!(clip.x.abs() < 1e-4 && clip.y.abs() < 1e-4);
        assert!(clip.w > 0.0);
    }

    #[test]
    fn view_cache_tracks_state_changes() {
        let mut camera = Camera::default();
        let first = camera.view();
        assert_eq!(camera.view(), first);
        camera.dolly(-2.0);
        assert_ne!(camera.view(), first);
    }
}
