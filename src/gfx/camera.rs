//! Auto-orbiting camera.
//!
//! The camera circles the origin at a fixed angular speed, slightly above
//! the model (eye height is half the orbit distance), and zooms in and out
//! along the orbit radius. Each frame it produces a [`CameraFrame`] that is
//! passed into the render call, making the write-before-draw ordering of
//! the matrix uniforms explicit instead of a call-order convention.

use cgmath::{perspective, Matrix4, Point3, Rad, Vector3};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.5,
    0.0, 0.0, 0.0, 1.0,
);

/// View and projection state for one frame, computed before the draw.
#[derive(Clone, Copy, Debug)]
pub struct CameraFrame {
    pub view: Matrix4<f32>,
    pub proj: Matrix4<f32>,
    pub eye: Point3<f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct OrbitCamera {
    pub distance: f32,
    pub yaw: f32,
    pub aspect: f32,
    pub fovy: Rad<f32>,
    pub znear: f32,
    pub zfar: f32,
    min_distance: f32,
}

impl OrbitCamera {
    pub fn new(distance: f32, aspect: f32) -> Self {
        Self {
            distance,
            yaw: 0.0,
            aspect,
            fovy: Rad(std::f32::consts::FRAC_PI_4),
            znear: 0.1,
            zfar: 1000.0,
            min_distance: 1.0,
        }
    }

    /// Advances the orbit by `dt` seconds (one radian per second).
    pub fn advance(&mut self, dt: f32) {
        self.yaw += dt;
    }

    /// Moves the eye along the orbit radius, clamped so the camera never
    /// reaches the target.
    pub fn zoom(&mut self, delta: f32) {
        self.distance = (self.distance + delta).max(self.min_distance);
    }

    pub fn resize_projection(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn eye(&self) -> Point3<f32> {
        Point3::new(
            self.yaw.sin() * self.distance,
            self.distance * 0.5,
            self.yaw.cos() * self.distance,
        )
    }

    /// Builds this frame's view and projection matrices.
    pub fn frame(&self) -> CameraFrame {
        let eye = self.eye();
        let view = Matrix4::look_at_rh(eye, Point3::new(0.0, 0.0, 0.0), Vector3::unit_y());
        let proj = OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar);
        CameraFrame { view, proj, eye }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_the_orbit() {
        let mut camera = OrbitCamera::new(20.0, 16.0 / 9.0);
        let before = camera.eye();
        camera.advance(0.5);
        let after = camera.eye();
        assert_ne!(before, after);
        // Distance to target is unchanged by orbiting.
        let r = |p: Point3<f32>| (p.x * p.x + p.z * p.z).sqrt();
        assert!((r(before) - r(after)).abs() < 1e-4);
    }

    #[test]
    fn zoom_clamps_at_minimum_distance() {
        let mut camera = OrbitCamera::new(2.0, 1.0);
        camera.zoom(-10.0);
        assert_eq!(camera.distance, 1.0);
        camera.zoom(0.5);
        assert_eq!(camera.distance, 1.5);
    }

    #[test]
    fn eye_sits_above_the_orbit_plane() {
        let camera = OrbitCamera::new(20.0, 1.0);
        assert_eq!(camera.eye().y, 10.0);
    }
}
