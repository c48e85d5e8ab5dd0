//! View extent resolution.
//!
//! Far above the ground the extent comes from the camera's projected view,
//! padded by the largest tile size so tiles at the border do not pop. Close to
//! the ground frustum projections degenerate at grazing angles, so a fixed
//! square around the camera is used instead and frustum culling is skipped.

use glam::DVec3;

use crate::tile::{TileBounds, TileSize};

/// Camera state consumed by the scheduler, in tile space.
///
/// Tile space is planar x/y with z as height above the ground plane.
pub trait ViewProvider {
    /// Camera position: x and y on the ground plane, z the height.
    fn camera_position(&self) -> DVec3;

    /// Ground rectangle the camera can see, grown by `padding` on every side.
    fn visible_extent(&self, padding: f64) -> ViewExtent;

    /// Whether a tile's bounding volume intersects the view frustum.
    fn is_visible(&self, bounds: &TileBounds) -> bool;
}

/// Axis-aligned ground rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewExtent {
    /// Western edge.
    pub min_x: f64,
    /// Southern edge.
    pub min_y: f64,
    /// Extent along x.
    pub width: f64,
    /// Extent along y.
    pub height: f64,
}

impl ViewExtent {
    pub fn new(min_x: f64, min_y: f64, width: f64, height: f64) -> Self {
        Self {
            min_x,
            min_y,
            width,
            height,
        }
    }

    pub fn from_corners(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Square of half-width `radius` around `(x, y)`.
    pub fn around(x: f64, y: f64, radius: f64) -> Self {
        Self::from_corners(x - radius, y - radius, x + radius, y + radius)
    }

    pub fn max_x(&self) -> f64 {
        self.min_x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.min_y + self.height
    }

    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x() && y >= self.min_y && y <= self.max_y()
    }

    /// Grow the rectangle by `padding` on each side.
    #[must_use]
    pub fn padded(&self, padding: f64) -> Self {
        Self::from_corners(
            self.min_x - padding,
            self.min_y - padding,
            self.max_x() + padding,
            self.max_y() + padding,
        )
    }
}

/// Which extent strategy was used for a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewMode {
    /// Frustum-projected extent; frustum culling applies.
    Far,
    /// Fixed radius around the camera; no frustum culling.
    Near,
}

impl ViewMode {
    pub fn allows_frustum_culling(self) -> bool {
        matches!(self, ViewMode::Far)
    }
}

/// Tuning for extent resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewSettings {
    /// Camera heights at or below this use [`ViewMode::Near`].
    pub ground_level_threshold: f64,
    /// Half-width of the near-mode square.
    pub ground_level_clip_range: f64,
    /// Cull far-mode candidates against the frustum.
    pub filter_by_frustum: bool,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            ground_level_threshold: 20.0,
            ground_level_clip_range: 1000.0,
            filter_by_frustum: true,
        }
    }
}

/// Outcome of extent resolution for one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedView {
    /// Strategy that produced the extent.
    pub mode: ViewMode,
    /// Ground rectangle to enumerate.
    pub extent: ViewExtent,
    /// Camera position for distance scoring.
    pub camera: DVec3,
}

impl ResolvedView {
    /// Whether candidates should be tested against the frustum.
    pub fn cull_with_frustum(&self, settings: &ViewSettings) -> bool {
        settings.filter_by_frustum && self.mode.allows_frustum_culling()
    }
}

/// Resolve the extent to enumerate tiles in.
pub fn resolve_view(
    view: &dyn ViewProvider,
    settings: &ViewSettings,
    max_tile_size: TileSize,
) -> ResolvedView {
    let camera = view.camera_position();
    if camera.z > settings.ground_level_threshold {
        ResolvedView {
            mode: ViewMode::Far,
            extent: view.visible_extent(max_tile_size.get() as f64),
            camera,
        }
    } else {
        ResolvedView {
            mode: ViewMode::Near,
            extent: ViewExtent::around(camera.x, camera.y, settings.ground_level_clip_range),
            camera,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FixedView;

    fn size(edge: i64) -> TileSize {
        TileSize::new(edge).unwrap()
    }

    #[test]
    fn test_high_camera_uses_far_mode_with_padding() {
        let view = FixedView::new(
            DVec3::new(0.0, 0.0, 500.0),
            ViewExtent::new(0.0, 0.0, 100.0, 100.0),
        );
        let resolved = resolve_view(&view, &ViewSettings::default(), size(50));
        assert_eq!(resolved.mode, ViewMode::Far);
        assert_eq!(resolved.extent, ViewExtent::new(-50.0, -50.0, 200.0, 200.0));
        assert!(resolved.cull_with_frustum(&ViewSettings::default()));
    }

    #[test]
    fn test_low_camera_uses_radial_square() {
        let view = FixedView::new(
            DVec3::new(300.0, 400.0, 20.0),
            ViewExtent::new(0.0, 0.0, 1.0, 1.0),
        );
        let resolved = resolve_view(&view, &ViewSettings::default(), size(50));
        assert_eq!(resolved.mode, ViewMode::Near);
        assert_eq!(resolved.extent, ViewExtent::around(300.0, 400.0, 1000.0));
        assert!(!resolved.cull_with_frustum(&ViewSettings::default()));
    }

    #[test]
    fn test_frustum_filter_can_be_disabled() {
        let settings = ViewSettings {
            filter_by_frustum: false,
            ..ViewSettings::default()
        };
        let view = FixedView::new(DVec3::new(0.0, 0.0, 900.0), ViewExtent::new(0.0, 0.0, 1.0, 1.0));
        let resolved = resolve_view(&view, &settings, size(10));
        assert_eq!(resolved.mode, ViewMode::Far);
        assert!(!resolved.cull_with_frustum(&settings));
    }

    #[test]
    fn test_extent_helpers() {
        let extent = ViewExtent::from_corners(-10.0, 5.0, 30.0, 25.0);
        assert_eq!(extent.width, 40.0);
        assert_eq!(extent.max_y(), 25.0);
        assert!(extent.contains(0.0, 10.0));
        assert!(!extent.contains(31.0, 10.0));
        assert!(!ViewExtent::new(f64::NAN, 0.0, 1.0, 1.0).is_finite());
    }
}
