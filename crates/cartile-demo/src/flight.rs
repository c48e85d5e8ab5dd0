//! Scripted camera path: a descending fly-over ending at ground level.

use cartile_stream::CameraView;
use glam::DVec3;

pub struct FlightPath {
    /// Where the flight begins.
    pub start: DVec3,
    /// Where the flight ends.
    pub end: DVec3,
    /// Vertical field of view in radians.
    pub fov_y: f64,
    /// Width over height.
    pub aspect: f64,
    /// Far clip distance in meters.
    pub far_clip: f64,
}

impl FlightPath {
    /// A run from 3 km up down to eye height, heading east.
    pub fn descent(far_clip: f64) -> Self {
        Self {
            start: DVec3::new(120_000.0, 480_000.0, 3_000.0),
            end: DVec3::new(126_000.0, 480_500.0, 2.0),
            fov_y: 60f64.to_radians(),
            aspect: 16.0 / 9.0,
            far_clip,
        }
    }

    /// Camera position at `t` in `[0, 1]`. Altitude drops faster early on.
    pub fn position(&self, t: f64) -> DVec3 {
        let t = t.clamp(0.0, 1.0);
        let planar = self.start.truncate().lerp(self.end.truncate(), t);
        let descent = 1.0 - (1.0 - t) * (1.0 - t);
        let height = self.start.z + (self.end.z - self.start.z) * descent;
        planar.extend(height)
    }

    /// Camera at `t`, looking ahead and down along the path.
    pub fn camera(&self, t: f64) -> CameraView {
        let position = self.position(t);
        let heading = (self.end - self.start).truncate().normalize_or_zero();
        let look_ahead = (position.z * 2.0).max(50.0);
        let target = (position.truncate() + heading * look_ahead).extend(0.0);
        CameraView::look_at(position, target, self.fov_y, self.aspect, self.far_clip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartile_stream::ViewProvider;

    #[test]
    fn test_path_endpoints() {
        let path = FlightPath::descent(5000.0);
        assert_eq!(path.position(0.0), path.start);
        assert!((path.position(1.0) - path.end).length() < 1e-9);
        assert_eq!(path.position(2.0), path.position(1.0));
    }

    #[test]
    fn test_camera_sees_ahead() {
        let path = FlightPath::descent(5000.0);
        let camera = path.camera(0.5);
        let position = camera.camera_position();
        let extent = camera.visible_extent(0.0);
        assert!(extent.max_x() > position.x);
    }
}
