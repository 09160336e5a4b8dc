//! Terminal ownership on the authoritative side.
//!
//! Only a cluster's origin holds a [`ServerMonitor`], and only once
//! something has asked for the terminal: wrapping a cell as a peripheral,
//! attaching a device or writing to it. Every other member reaches the
//! terminal by walking to its origin.
//!
//! Each tick the origin reports a resize to every device in the cluster and
//! then, if anything changed, queues itself with the [`Watcher`]. Geometry
//! updates always reach the watcher first (see [`Watcher::flush`]), so a
//! replica never sees a diff sized for dimensions it has not heard about.

use bitflags::bitflags;
use n_term::TerminalBuffer;
use tracing::{debug, trace};

use crate::config::MonitorConfig;
use crate::device::{DeviceEvent, DeviceId, DeviceSink};
use crate::error::{MonitorError, Result};
use crate::geometry::BlockPos;
use crate::monitor::Monitors;
use crate::sync::Watcher;
use crate::world::MonitorWorld;

bitflags! {
    /// What the next tick has to report.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SyncFlags: u8 {
        /// Terminal dimensions changed; devices must be told.
        const RESIZED = 1;
        /// Terminal content changed outside the version counter.
        const CHANGED = 1 << 1;
    }
}

/// Text size multiplier, 0.5 to 5.0 in steps of 0.5.
///
/// ```
/// use n_cluster::server::TextScale;
///
/// assert_eq!(TextScale::new(1.5).unwrap().value(), 1.5);
/// assert!(TextScale::new(1.2).is_err());
/// assert!(TextScale::new(0.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextScale(u8);

impl TextScale {
    pub const DEFAULT: Self = Self(2);

    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidTextScale`] if `scale` is not a
    /// multiple of 0.5 between 0.5 and 5.0.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(scale: f64) -> Result<Self> {
        let steps = scale * 2.0;
        if !(1.0..=10.0).contains(&steps) || steps.fract().abs() > f64::EPSILON {
            return Err(MonitorError::InvalidTextScale(scale));
        }
        Ok(Self(steps as u8))
    }

    #[must_use]
    pub fn value(self) -> f64 {
        f64::from(self.0) / 2.0
    }
}

impl Default for TextScale {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Character grid size for a `width × height` block cluster.
///
/// Each axis gets the screen area left inside the border and margin,
/// divided by the glyph size at this scale, rounded, and at least 1.
#[must_use]
pub fn terminal_size(width: i32, height: i32, scale: TextScale, config: &MonitorConfig) -> (u16, u16) {
    let inset = 2.0 * config.inset();
    let pixel = scale.value() * config.pixel_scale;
    let cols = (f64::from(width) - inset) / (pixel * config.font_width);
    let rows = (f64::from(height) - inset) / (pixel * config.font_height);
    (to_chars(cols), to_chars(rows))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_chars(extent: f64) -> u16 {
    extent.round().clamp(1.0, f64::from(u16::MAX)) as u16
}

/// The authoritative terminal of one cluster.
#[derive(Debug)]
pub struct ServerMonitor {
    terminal: TerminalBuffer,
    colour: bool,
    text_scale: TextScale,
    flags: SyncFlags,
    /// Terminal version at the last change poll.
    observed: u64,
}

impl ServerMonitor {
    /// An empty 0×0 terminal. Call [`rebuild`](Self::rebuild) to size it.
    #[must_use]
    pub fn new(colour: bool) -> Self {
        Self {
            terminal: TerminalBuffer::new(0, 0),
            colour,
            text_scale: TextScale::DEFAULT,
            flags: SyncFlags::empty(),
            observed: 0,
        }
    }

    /// Size the terminal for a `width × height` cluster. A size change
    /// clears the screen and raises both flags.
    pub fn rebuild(&mut self, width: i32, height: i32, config: &MonitorConfig) {
        let (cols, rows) = terminal_size(width, height, self.text_scale, config);
        if self.terminal.size() != (cols, rows) {
            self.terminal.resize(cols, rows);
            self.flags |= SyncFlags::RESIZED | SyncFlags::CHANGED;
            trace!(cols, rows, "rebuilt terminal");
        }
    }

    #[must_use]
    pub const fn terminal(&self) -> &TerminalBuffer {
        &self.terminal
    }

    pub const fn terminal_mut(&mut self) -> &mut TerminalBuffer {
        &mut self.terminal
    }

    #[must_use]
    pub const fn is_colour(&self) -> bool {
        self.colour
    }

    #[must_use]
    pub const fn text_scale(&self) -> TextScale {
        self.text_scale
    }

    #[must_use]
    pub const fn flags(&self) -> SyncFlags {
        self.flags
    }

    /// Whether the terminal was resized since the last poll. Clears the flag.
    pub fn poll_resized(&mut self) -> bool {
        let resized = self.flags.contains(SyncFlags::RESIZED);
        self.flags.remove(SyncFlags::RESIZED);
        resized
    }

    /// Whether anything changed since the last poll. Clears the flag.
    pub fn poll_changed(&mut self) -> bool {
        let version = self.terminal.version();
        let changed = self.flags.contains(SyncFlags::CHANGED) || version != self.observed;
        self.flags.remove(SyncFlags::CHANGED);
        self.observed = version;
        changed
    }
}

impl<W: MonitorWorld + ?Sized> Monitors<'_, W> {
    /// The terminal of `pos`'s cluster, if its origin is loaded and has one.
    #[must_use]
    pub fn terminal(&self, pos: BlockPos) -> Option<&TerminalBuffer> {
        let origin = self.origin(pos)?;
        self.world
            .monitor(origin)?
            .server
            .as_ref()
            .map(ServerMonitor::terminal)
    }

    /// The terminal of `pos`'s cluster for writing, created on first use.
    ///
    /// Marks `pos` as wrapped, so the cluster keeps its terminal across
    /// later resizes. Returns `None` when the origin is not loaded.
    pub fn terminal_mut(&mut self, pos: BlockPos) -> Option<&mut TerminalBuffer> {
        self.server_mut(pos).map(ServerMonitor::terminal_mut)
    }

    /// Wrap the cell at `pos` as a peripheral, creating the cluster's
    /// terminal if needed. Returns whether the origin was reachable.
    pub fn wrap_peripheral(&mut self, pos: BlockPos) -> bool {
        self.server_mut(pos).is_some()
    }

    /// Attach a device to the cell at `pos`. The cell becomes a peripheral.
    pub fn attach_device(&mut self, pos: BlockPos, device: DeviceId) -> bool {
        if !self.wrap_peripheral(pos) {
            return false;
        }
        let Some(monitor) = self.world.monitor_mut(pos) else {
            return false;
        };
        debug!(%pos, %device, "attached device");
        monitor.devices.insert(device)
    }

    pub fn detach_device(&mut self, pos: BlockPos, device: DeviceId) -> bool {
        self.world
            .monitor_mut(pos)
            .is_some_and(|monitor| monitor.devices.remove(&device))
    }

    /// Change the text scale of `pos`'s cluster and resize its terminal to
    /// match. Returns `Ok(false)` if the origin was not reachable.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidTextScale`] for an unsupported scale.
    pub fn set_text_scale(&mut self, pos: BlockPos, scale: f64) -> Result<bool> {
        let scale = TextScale::new(scale)?;
        let config = self.config;
        let Some(origin) = self.origin(pos) else {
            return Ok(false);
        };
        if self.server_mut(pos).is_none() {
            return Ok(false);
        }
        let Some(monitor) = self.world.monitor_mut(origin) else {
            return Ok(false);
        };
        let (width, height) = (monitor.state.width, monitor.state.height);
        if let Some(server) = monitor.server.as_mut() {
            server.text_scale = scale;
            server.rebuild(width, height, config);
        }
        Ok(true)
    }

    /// Per-tick work for the cluster whose origin is `pos`. Does nothing for
    /// non-origins and for clusters without a terminal.
    pub fn tick(&mut self, pos: BlockPos, sink: &mut impl DeviceSink, watcher: &mut Watcher) {
        let Some(monitor) = self.world.monitor_mut(pos) else {
            return;
        };
        if !monitor.state.is_origin() {
            return;
        }
        let Some(server) = monitor.server.as_mut() else {
            return;
        };

        let resized = server.poll_resized();
        let changed = server.poll_changed();
        let (cols, rows) = server.terminal().size();

        if resized {
            debug!(%pos, cols, rows, "terminal resized");
            self.notify_devices(pos, DeviceEvent::Resize { cols, rows }, sink);
        }
        if changed {
            watcher.enqueue(pos);
        }
    }

    /// [`tick`](Self::tick) every loaded cell.
    pub fn tick_all(&mut self, sink: &mut impl DeviceSink, watcher: &mut Watcher) {
        for pos in self.world.loaded_monitors() {
            self.tick(pos, sink, watcher);
        }
    }

    /// Queue `event` for every device attached anywhere in `pos`'s cluster.
    pub(crate) fn notify_devices(&self, pos: BlockPos, event: DeviceEvent, sink: &mut impl DeviceSink) {
        for member in self.members(pos) {
            let Some(monitor) = self.world.monitor(member) else {
                continue;
            };
            for &device in &monitor.devices {
                sink.queue_event(device, event);
            }
        }
    }

    /// Mark `pos` as wrapped and return its cluster's server, creating it on
    /// the origin if needed.
    fn server_mut(&mut self, pos: BlockPos) -> Option<&mut ServerMonitor> {
        let origin = self.origin(pos)?;
        self.world.monitor_mut(pos)?.peripheral = true;

        let config = self.config;
        let monitor = self.world.monitor_mut(origin)?;
        let (width, height) = (monitor.state.width, monitor.state.height);
        let colour = monitor.kind.is_colour();
        Some(monitor.server.get_or_insert_with(|| {
            trace!(%origin, "created terminal");
            let mut server = ServerMonitor::new(colour);
            server.rebuild(width, height, config);
            server
        }))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::geometry::Rotation;
    use crate::monitor::Kind;
    use crate::world::GridWorld;

    fn at(x: i32, y: i32) -> BlockPos {
        BlockPos::new(-x, y, 0)
    }

    fn place_grid(monitors: &mut Monitors<'_, GridWorld>, kind: Kind, width: i32, height: i32) {
        for y in 0..height {
            for x in 0..width {
                monitors.place(at(x, y), kind, Rotation::NORTH);
            }
        }
    }

    #[test]
    fn single_block_at_default_scale_is_seven_by_five() {
        let config = MonitorConfig::default();
        assert_eq!(terminal_size(1, 1, TextScale::DEFAULT, &config), (7, 5));
        assert_eq!(terminal_size(8, 6, TextScale::DEFAULT, &config), (82, 40));
    }

    #[test]
    fn larger_scale_means_fewer_characters() {
        let config = MonitorConfig::default();
        let big = TextScale::new(5.0).unwrap();
        assert_eq!(terminal_size(1, 1, big, &config), (1, 1));
        let small = TextScale::new(0.5).unwrap();
        assert_eq!(terminal_size(1, 1, small, &config), (15, 10));
    }

    #[test]
    fn text_scale_bounds() {
        assert!(TextScale::new(0.5).is_ok());
        assert!(TextScale::new(5.0).is_ok());
        assert!(TextScale::new(5.5).is_err());
        assert!(TextScale::new(f64::NAN).is_err());
        assert!(matches!(
            TextScale::new(0.75),
            Err(MonitorError::InvalidTextScale(_))
        ));
    }

    #[test]
    fn rebuild_raises_flags_only_on_size_change() {
        let config = MonitorConfig::default();
        let mut server = ServerMonitor::new(false);
        server.rebuild(1, 1, &config);
        assert_eq!(server.flags(), SyncFlags::RESIZED | SyncFlags::CHANGED);
        assert!(server.poll_resized());
        assert!(server.poll_changed());
        assert!(!server.poll_resized());
        assert!(!server.poll_changed());

        server.rebuild(1, 1, &config);
        assert_eq!(server.flags(), SyncFlags::empty());
    }

    #[test]
    fn writes_are_seen_as_changes() {
        let config = MonitorConfig::default();
        let mut server = ServerMonitor::new(false);
        server.rebuild(1, 1, &config);
        server.poll_changed();
        server.terminal_mut().write("hi");
        assert!(server.poll_changed());
        assert!(!server.poll_changed());
    }

    #[test]
    fn terminal_is_lazy() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        let mut monitors = Monitors::new(&mut world, &config);
        place_grid(&mut monitors, Kind::Normal, 2, 1);

        assert!(monitors.terminal(at(1, 0)).is_none());
        let terminal = monitors.terminal_mut(at(1, 0)).unwrap();
        assert_eq!(terminal.size(), (18, 5));

        assert!(monitors.terminal(at(0, 0)).is_some());
        assert!(world.monitor(at(0, 0)).unwrap().server().is_some());
        assert!(world.monitor(at(1, 0)).unwrap().server().is_none());
        assert!(world.monitor(at(1, 0)).unwrap().is_peripheral());
    }

    #[test]
    fn unwrapped_clusters_drop_their_terminal_on_resize() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        let mut monitors = Monitors::new(&mut world, &config);
        monitors.place(at(0, 0), Kind::Normal, Rotation::NORTH);
        monitors.world_mut().monitor_mut(at(0, 0)).unwrap().server = Some(ServerMonitor::new(false));
        monitors.place(at(1, 0), Kind::Normal, Rotation::NORTH);

        assert!(monitors.terminal(at(0, 0)).is_none());
    }

    #[test]
    fn wrapped_clusters_keep_and_resize_their_terminal() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        let mut monitors = Monitors::new(&mut world, &config);
        monitors.place(at(0, 0), Kind::Normal, Rotation::NORTH);
        monitors.terminal_mut(at(0, 0)).unwrap().write("x");
        monitors.place(at(1, 0), Kind::Normal, Rotation::NORTH);

        let terminal = monitors.terminal(at(1, 0)).unwrap();
        assert_eq!(terminal.size(), (18, 5));
        assert_eq!(terminal.row_text(0).unwrap().trim(), "");
    }

    #[test]
    fn set_text_scale_resizes_terminal() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        let mut monitors = Monitors::new(&mut world, &config);
        monitors.place(at(0, 0), Kind::Normal, Rotation::NORTH);

        assert!(monitors.set_text_scale(at(0, 0), 0.5).unwrap());
        assert_eq!(monitors.terminal(at(0, 0)).unwrap().size(), (15, 10));
        assert!(monitors.set_text_scale(at(0, 0), 0.3).is_err());
        assert!(!monitors.set_text_scale(at(5, 5), 1.0).unwrap());
    }

    #[test]
    fn resize_is_reported_to_every_device_in_the_cluster() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        let mut watcher = Watcher::new();
        let mut sink: Vec<(DeviceId, DeviceEvent)> = Vec::new();
        let mut monitors = Monitors::new(&mut world, &config);
        place_grid(&mut monitors, Kind::Advanced, 2, 1);
        assert!(monitors.attach_device(at(0, 0), DeviceId(1)));
        assert!(monitors.attach_device(at(1, 0), DeviceId(2)));

        monitors.tick(at(1, 0), &mut sink, &mut watcher);
        assert!(sink.is_empty());

        monitors.tick(at(0, 0), &mut sink, &mut watcher);
        let resize = DeviceEvent::Resize { cols: 18, rows: 5 };
        assert_eq!(sink, vec![(DeviceId(1), resize), (DeviceId(2), resize)]);
        assert_eq!(watcher.queued(), vec![at(0, 0)]);

        sink.clear();
        monitors.tick(at(0, 0), &mut sink, &mut watcher);
        assert!(sink.is_empty());
    }

    #[test]
    fn detached_devices_stop_hearing_events() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        let mut watcher = Watcher::new();
        let mut sink: Vec<(DeviceId, DeviceEvent)> = Vec::new();
        let mut monitors = Monitors::new(&mut world, &config);
        monitors.place(at(0, 0), Kind::Normal, Rotation::NORTH);
        monitors.attach_device(at(0, 0), DeviceId(7));
        assert!(monitors.detach_device(at(0, 0), DeviceId(7)));
        assert!(!monitors.detach_device(at(0, 0), DeviceId(7)));

        monitors.tick_all(&mut sink, &mut watcher);
        assert!(sink.is_empty());
    }
}
