//! Turning a click on a monitor face into a character position.
//!
//! A hit arrives as a point inside the clicked block's unit cube. It is
//! projected onto the front face as `(u, v)`, where `u` grows along the
//! cluster's right axis and `v` grows from the top edge of the screen. The
//! cell's index then places it within the whole cluster, with row 0 at the
//! top. Points inside the rendered border are ignored, and the rest are
//! scaled linearly onto the terminal's 1-based grid.

use tracing::debug;

use crate::config::MonitorConfig;
use crate::device::{DeviceEvent, DeviceSink};
use crate::geometry::{BlockPos, Facing, Rotation};
use crate::monitor::{MonitorState, Monitors};
use crate::world::MonitorWorld;

/// A point on a block's front face, each coordinate in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacePoint {
    pub u: f64,
    pub v: f64,
}

impl FacePoint {
    #[must_use]
    pub const fn new(u: f64, v: f64) -> Self {
        Self { u, v }
    }

    /// Project a hit point in block-local coordinates (each axis `[0, 1]`)
    /// onto the front face of a monitor with the given rotation.
    ///
    /// ```
    /// use n_cluster::geometry::Rotation;
    /// use n_cluster::touch::FacePoint;
    ///
    /// // North-facing wall: right is west, so u runs from x = 1 to x = 0.
    /// let p = FacePoint::from_hit([0.25, 0.75, 0.0], Rotation::NORTH);
    /// assert_eq!((p.u, p.v), (0.75, 0.25));
    /// ```
    #[must_use]
    pub fn from_hit(hit: [f64; 3], rotation: Rotation) -> Self {
        let u = along(hit, rotation.right());
        // v counts from the far end of the down axis, which is the top row.
        let v = 1.0 - along(hit, rotation.down());
        Self { u, v }
    }
}

/// How far `hit` lies along `facing`, from the face opposite it.
fn along(hit: [f64; 3], facing: Facing) -> f64 {
    let (dx, dy, dz) = facing.vector();
    let (coord, sign) = if dx != 0 {
        (hit[0], dx)
    } else if dy != 0 {
        (hit[1], dy)
    } else {
        (hit[2], dz)
    };
    if sign > 0 { coord } else { 1.0 - coord }
}

/// Map a face point on the cell with geometry `state` to a 1-based
/// `(col, row)` on a terminal of `size`. `None` if the point lies in the
/// border or the terminal is empty.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn map_touch(
    state: &MonitorState,
    point: FacePoint,
    size: (u16, u16),
    config: &MonitorConfig,
) -> Option<(u16, u16)> {
    let (cols, rows) = size;
    if cols == 0 || rows == 0 {
        return None;
    }

    let x = point.u + f64::from(state.x_index);
    let y = point.v + f64::from(state.height - state.y_index - 1);
    let width = f64::from(state.width);
    let height = f64::from(state.height);

    let border = config.render_border;
    if x > width - border || y > height - border || x < border || y < border {
        return None;
    }

    let inset = config.inset();
    let (cols, rows) = (f64::from(cols), f64::from(rows));
    let char_width = (width - 2.0 * inset) / cols;
    let char_height = (height - 2.0 * inset) / rows;

    let col = ((x - inset) / char_width + 1.0).max(1.0).min(cols);
    let row = ((y - inset) / char_height + 1.0).max(1.0).min(rows);
    Some((col as u16, row as u16))
}

impl<W: MonitorWorld + ?Sized> Monitors<'_, W> {
    /// Handle a click at `hit` on face `side` of the cell at `pos`.
    ///
    /// Only the front face of an advanced monitor whose cluster already has
    /// a terminal responds. The resulting position is queued as a touch
    /// event for every device in the cluster and returned.
    pub fn touch(
        &mut self,
        pos: BlockPos,
        side: Facing,
        hit: [f64; 3],
        sink: &mut impl DeviceSink,
    ) -> Option<(u16, u16)> {
        let state = self.state(pos)?;
        if side != state.rotation.front() {
            return None;
        }

        let origin = self.origin(pos)?;
        let server = self.world.monitor(origin)?.server()?;
        if !server.is_colour() {
            return None;
        }
        let size = server.terminal().size();

        let point = FacePoint::from_hit(hit, state.rotation);
        let (col, row) = map_touch(&state, point, size, self.config)?;
        debug!(%pos, col, row, "monitor touched");
        self.notify_devices(pos, DeviceEvent::Touch { col, row }, sink);
        Some((col, row))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::device::DeviceId;
    use crate::monitor::Kind;
    use crate::world::GridWorld;

    fn at(x: i32, y: i32) -> BlockPos {
        BlockPos::new(-x, y, 0)
    }

    fn single() -> MonitorState {
        MonitorState::single(Rotation::NORTH)
    }

    #[test]
    fn centre_of_single_block_hits_centre_character() {
        let config = MonitorConfig::default();
        let hit = map_touch(&single(), FacePoint::new(0.5, 0.5), (7, 5), &config);
        assert_eq!(hit, Some((4, 3)));
    }

    #[test]
    fn border_touches_are_ignored() {
        let config = MonitorConfig::default();
        for point in [
            FacePoint::new(0.05, 0.5),
            FacePoint::new(0.95, 0.5),
            FacePoint::new(0.5, 0.05),
            FacePoint::new(0.5, 0.95),
        ] {
            assert_eq!(map_touch(&single(), point, (7, 5), &config), None, "{point:?}");
        }
    }

    #[test]
    fn margin_touches_clamp_to_the_edge_characters() {
        let config = MonitorConfig::default();
        let top_left = map_touch(&single(), FacePoint::new(0.13, 0.13), (7, 5), &config);
        assert_eq!(top_left, Some((1, 1)));
        let bottom_right = map_touch(&single(), FacePoint::new(0.87, 0.87), (7, 5), &config);
        assert_eq!(bottom_right, Some((7, 5)));
    }

    #[test]
    fn bottom_row_of_a_tall_cluster_maps_to_the_last_rows() {
        let config = MonitorConfig::default();
        let bottom = MonitorState {
            x_index: 0,
            y_index: 0,
            width: 1,
            height: 2,
            rotation: Rotation::NORTH,
        };
        let top = MonitorState { y_index: 1, ..bottom };
        let size = (7, 12);

        let (_, row_top) = map_touch(&top, FacePoint::new(0.5, 0.5), size, &config).unwrap();
        let (_, row_bottom) = map_touch(&bottom, FacePoint::new(0.5, 0.5), size, &config).unwrap();
        assert!(row_top < row_bottom);
    }

    #[test]
    fn hits_project_along_each_mount() {
        let wall = FacePoint::from_hit([1.0, 1.0, 0.0], Rotation::NORTH);
        assert_eq!((wall.u, wall.v), (0.0, 0.0));

        // East-facing wall: right is north (-z).
        let east = Rotation::try_from(5).unwrap();
        let p = FacePoint::from_hit([1.0, 0.0, 0.25], east);
        assert_eq!((p.u, p.v), (0.75, 1.0));

        // Ceiling screen facing north: down is north (-z), so the top edge
        // is at z = 0.
        let ceiling = Rotation::try_from(8).unwrap();
        let p = FacePoint::from_hit([0.5, 0.0, 0.0], ceiling);
        assert_eq!(p.v, 0.0);
    }

    #[test]
    fn touch_fans_out_to_every_device() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        let mut sink: Vec<(DeviceId, DeviceEvent)> = Vec::new();
        let mut monitors = Monitors::new(&mut world, &config);
        monitors.place(at(0, 0), Kind::Advanced, Rotation::NORTH);
        monitors.place(at(1, 0), Kind::Advanced, Rotation::NORTH);
        monitors.attach_device(at(0, 0), DeviceId(1));
        monitors.attach_device(at(1, 0), DeviceId(2));

        let hit = monitors.touch(at(1, 0), Facing::North, [0.5, 0.5, 0.0], &mut sink);
        let touch = DeviceEvent::Touch { col: 15, row: 3 };
        assert_eq!(hit, Some((15, 3)));
        assert_eq!(sink, vec![(DeviceId(1), touch), (DeviceId(2), touch)]);
    }

    #[test]
    fn touch_needs_front_face_colour_and_terminal() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        let mut sink: Vec<(DeviceId, DeviceEvent)> = Vec::new();
        let mut monitors = Monitors::new(&mut world, &config);
        monitors.place(at(0, 0), Kind::Advanced, Rotation::NORTH);
        monitors.place(at(0, 3), Kind::Normal, Rotation::NORTH);
        let centre = [0.5, 0.5, 0.0];

        // No terminal yet.
        assert_eq!(monitors.touch(at(0, 0), Facing::North, centre, &mut sink), None);

        monitors.wrap_peripheral(at(0, 0));
        assert_eq!(monitors.touch(at(0, 0), Facing::South, centre, &mut sink), None);
        assert_eq!(monitors.touch(at(0, 0), Facing::North, centre, &mut sink), Some((4, 3)));

        monitors.wrap_peripheral(at(0, 3));
        assert_eq!(monitors.touch(at(0, 3), Facing::North, centre, &mut sink), None);
        assert!(sink.is_empty());
    }
}
