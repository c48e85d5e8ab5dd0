//! View frustum planes and a perspective camera expressed in tile space.
//!
//! Tile space is right-handed with z up: tiles lie on the `z = 0` plane and the
//! camera height is its z coordinate.

use glam::{DMat4, DVec2, DVec3, DVec4};

use crate::tile::TileBounds;
use crate::view::{ViewExtent, ViewProvider};

/// Plane indices into the frustum planes array.
const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// Six inward-pointing planes extracted from a view-projection matrix.
#[derive(Clone, Debug)]
pub struct Frustum {
    /// Each `DVec4(a, b, c, d)` holds a unit inward normal and distance term.
    planes: [DVec4; 6],
}

impl Frustum {
    /// Extract planes (Griggs-Hartmann) from a view-projection matrix whose
    /// clip-space depth runs from 0 at the near plane to 1 at the far plane,
    /// as produced by `DMat4::perspective_rh`.
    pub fn from_view_projection(vp: &DMat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [DVec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        planes[NEAR] = rows[2];
        planes[FAR] = rows[3] - rows[2];

        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }

        Self { planes }
    }

    /// Whether the box `[min, max]` is at least partially inside.
    ///
    /// Conservative p-vertex test: boxes near frustum corners may be reported
    /// visible when they are not, visible boxes are never rejected.
    pub fn intersects_box(&self, min: DVec3, max: DVec3) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            let p = DVec3::new(
                if normal.x >= 0.0 { max.x } else { min.x },
                if normal.y >= 0.0 { max.y } else { min.y },
                if normal.z >= 0.0 { max.z } else { min.z },
            );
            normal.dot(p) + plane.w >= 0.0
        })
    }
}

/// Perspective camera in tile space, usable as a [`ViewProvider`].
#[derive(Clone, Debug)]
pub struct CameraView {
    position: DVec3,
    inverse_view_projection: DMat4,
    frustum: Frustum,
    far_clip: f64,
}

impl CameraView {
    /// Near clip distance used by [`CameraView::look_at`].
    pub const NEAR_CLIP: f64 = 1.0;

    /// Build from an explicit view-projection matrix (0..1 clip depth).
    pub fn new(position: DVec3, view_projection: DMat4, far_clip: f64) -> Self {
        Self {
            position,
            inverse_view_projection: view_projection.inverse(),
            frustum: Frustum::from_view_projection(&view_projection),
            far_clip,
        }
    }

    /// Camera at `position` looking at `target`. `position` and `target` must differ.
    pub fn look_at(position: DVec3, target: DVec3, fov_y: f64, aspect: f64, far_clip: f64) -> Self {
        let forward = (target - position).normalize_or_zero();
        // Looking straight down or up leaves z useless as an up vector.
        let up = if forward.cross(DVec3::Z).length_squared() < 1e-9 {
            DVec3::Y
        } else {
            DVec3::Z
        };
        let view = DMat4::look_at_rh(position, target, up);
        let projection = DMat4::perspective_rh(fov_y, aspect, Self::NEAR_CLIP, far_clip);
        Self::new(position, projection * view, far_clip)
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Ground points reached by the four frustum edge rays. A ray that stays
    /// above or below the ground contributes its far corner instead.
    fn ground_footprint(&self) -> [DVec2; 4] {
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        corners.map(|(x, y)| {
            let near = self.inverse_view_projection.project_point3(DVec3::new(x, y, 0.0));
            let far = self.inverse_view_projection.project_point3(DVec3::new(x, y, 1.0));
            ground_hit(near, far).unwrap_or(far).truncate()
        })
    }
}

/// Point where segment `a -> b` crosses `z = 0`, if it does.
fn ground_hit(a: DVec3, b: DVec3) -> Option<DVec3> {
    if (a.z > 0.0) == (b.z > 0.0) || a.z == b.z {
        return None;
    }
    let t = a.z / (a.z - b.z);
    Some(a + (b - a) * t)
}

impl ViewProvider for CameraView {
    fn camera_position(&self) -> DVec3 {
        self.position
    }

    fn visible_extent(&self, padding: f64) -> ViewExtent {
        let camera = self.position.truncate();
        let mut min = camera;
        let mut max = camera;
        for point in self.ground_footprint() {
            min = min.min(point);
            max = max.max(point);
        }
        let reach = DVec2::splat(self.far_clip);
        let min = min.max(camera - reach);
        let max = max.min(camera + reach);
        ViewExtent::from_corners(min.x, min.y, max.x, max.y).padded(padding)
    }

    fn is_visible(&self, bounds: &TileBounds) -> bool {
        self.frustum.intersects_box(
            DVec3::new(bounds.min_x, bounds.min_y, 0.0),
            DVec3::new(bounds.max_x, bounds.max_y, 0.0),
        )
    }
}
