//! Cluster membership: merging neighbouring clusters and splitting them
//! again when a cell disappears.
//!
//! Every structural change funnels through [`Monitors::resize`], which
//! rewrites the geometry of each cell in a rectangle and decides whether the
//! new origin keeps a terminal. Merging ([`Monitors::expand`]) and splitting
//! ([`Monitors::contract`]) run as loops over explicit work items so that
//! long chains of adjacent clusters never deepen the call stack.
//!
//! Lookups here are structural and may force unloaded regions to load.

use tracing::{debug, trace, warn};

use crate::geometry::{BlockPos, Rotation};
use crate::monitor::{Kind, Lookup, Monitor, MonitorState, Monitors};
use crate::server::ServerMonitor;
use crate::world::MonitorWorld;

/// A rectangle of cluster indices, relative to the origin being contracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

impl Span {
    const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Cut around the hole at `(hx, hy)`: full rows before it, the run to
    /// its left, the run to its right, full rows after it. Empty pieces
    /// are dropped.
    fn split_around(self, hx: i32, hy: i32) -> Vec<Self> {
        let pieces = [
            Self::new(self.x, self.y, self.w, hy - self.y),
            Self::new(self.x, hy, hx - self.x, 1),
            Self::new(hx + 1, hy, self.x + self.w - hx - 1, 1),
            Self::new(self.x, hy + 1, self.w, self.y + self.h - hy - 1),
        ];
        pieces.into_iter().filter(|s| s.w > 0 && s.h > 0).collect()
    }
}

impl<W: MonitorWorld + ?Sized> Monitors<'_, W> {
    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Put a fresh cell at `pos` and merge it with whatever it touches.
    /// Anything already at `pos` is removed first.
    pub fn place(&mut self, pos: BlockPos, kind: Kind, rotation: Rotation) {
        if self.world.monitor(pos).is_some() {
            self.remove(pos);
        }
        self.world.insert(pos, Monitor::new(kind, rotation));
        self.world.mark_updated(pos);
        debug!(%pos, ?kind, rotation = rotation.raw(), "placed monitor");
        self.expand(pos);
    }

    /// Take the cell at `pos` out of the world, splitting its cluster
    /// around the gap.
    pub fn remove(&mut self, pos: BlockPos) -> Option<Monitor> {
        let monitor = self.world.monitor_mut(pos)?;
        if monitor.destroyed {
            return None;
        }
        monitor.destroyed = true;

        self.contract_neighbours(pos);
        self.world.mark_updated(pos);
        debug!(%pos, "removed monitor");
        self.world.remove(pos)
    }

    /// Give the cell at `pos` a new rotation. It leaves its cluster first
    /// and then merges with whatever matches the new orientation.
    pub fn rotate(&mut self, pos: BlockPos, rotation: Rotation) {
        self.detach(pos, Some(rotation));
    }

    /// Check the persisted geometry of a freshly loaded cell against its
    /// origin. A cell whose origin is gone is contracted; a cell that
    /// disagrees with its origin (or has nonsense geometry) is detached and
    /// re-expanded on its own.
    pub fn on_load(&mut self, pos: BlockPos) {
        let Some(state) = self.state(pos) else {
            return;
        };

        let cfg = self.config;
        if !state.index_in_bounds() || state.width > cfg.max_width || state.height > cfg.max_height
        {
            warn!(%pos, ?state, "loaded monitor has impossible geometry");
            self.detach(pos, None);
            return;
        }

        let Some(origin) = self.neighbour(pos, 0, 0, Lookup::Force) else {
            debug!(%pos, "loaded monitor has lost its origin");
            self.contract(pos);
            return;
        };

        let agrees = self
            .state(origin)
            .is_some_and(|o| state.agrees_with_origin(pos, origin, &o));
        if !agrees {
            warn!(%pos, %origin, "loaded monitor disagrees with its origin");
            self.detach(pos, None);
        }
    }

    fn detach(&mut self, pos: BlockPos, rotation: Option<Rotation>) {
        if self.world.monitor(pos).is_none() {
            return;
        }
        self.contract_neighbours(pos);

        if let Some(monitor) = self.world.monitor_mut(pos) {
            let rotation = rotation.unwrap_or(monitor.state.rotation);
            monitor.state = MonitorState::single(rotation);
            monitor.server = None;
        }
        self.world.mark_updated(pos);
        self.expand(pos);
    }

    // ── Resize ───────────────────────────────────────────────────────────

    /// Make `pos` the origin of a `width × height` cluster and rewrite the
    /// geometry of every cell found in that rectangle.
    ///
    /// The origin keeps (or gains) a terminal only if some member is
    /// wrapped as a peripheral. Cells outside the rectangle are left alone.
    pub fn resize(&mut self, pos: BlockPos, width: i32, height: i32) {
        let Some(monitor) = self.world.monitor_mut(pos) else {
            return;
        };
        if !monitor.state.is_origin() {
            monitor.server = None;
        }
        monitor.state.x_index = 0;
        monitor.state.y_index = 0;
        monitor.state.width = width;
        monitor.state.height = height;
        let rotation = monitor.state.rotation;
        let colour = monitor.kind.is_colour();

        let mut members = Vec::with_capacity(usize::try_from(width * height).unwrap_or(0));
        for y in 0..height {
            for x in 0..width {
                if let Some(member) = self.neighbour(pos, x, y, Lookup::Force) {
                    members.push((x, y, member));
                }
            }
        }

        let needs_terminal = members
            .iter()
            .any(|&(_, _, p)| self.world.monitor(p).is_some_and(|m| m.peripheral));

        let config = self.config;
        if let Some(origin) = self.world.monitor_mut(pos) {
            if needs_terminal {
                origin
                    .server
                    .get_or_insert_with(|| ServerMonitor::new(colour))
                    .rebuild(width, height, config);
            } else {
                origin.server = None;
            }
        }

        for (x, y, member) in members {
            if let Some(monitor) = self.world.monitor_mut(member) {
                monitor.state = MonitorState {
                    x_index: x,
                    y_index: y,
                    width,
                    height,
                    rotation,
                };
                if member != pos {
                    monitor.server = None;
                }
            }
            self.world.mark_updated(member);
        }

        trace!(%pos, width, height, needs_terminal, "resized cluster");
    }

    // ── Expand ───────────────────────────────────────────────────────────

    /// Merge the cluster containing `pos` with compatible neighbours until
    /// nothing more fits.
    pub fn expand(&mut self, pos: BlockPos) {
        let mut current = pos;
        while let Some(next) = self.merge_once(current) {
            current = next;
        }
    }

    /// Try each direction in turn; on success, return the cell to carry on
    /// from.
    fn merge_once(&mut self, pos: BlockPos) -> Option<BlockPos> {
        if let Some(next) = self.merge_left(pos) {
            return Some(next);
        }
        if let Some(next) = self.merge_right(pos) {
            return Some(next);
        }
        if let Some(next) = self.merge_up(pos) {
            return Some(next);
        }
        self.merge_down(pos)
    }

    fn merge_left(&mut self, pos: BlockPos) -> Option<BlockPos> {
        let me = self.state(pos)?;
        let left = self.neighbour(pos, -1, 0, Lookup::Force)?;
        let other = self.state(left)?;
        if other.y_index != 0 || other.height != me.height {
            return None;
        }
        let width = other.width + me.width;
        if width > self.config.max_width {
            return None;
        }

        let origin = self.neighbour(left, 0, 0, Lookup::Force)?;
        debug!(%pos, %origin, width, height = me.height, "merging left");
        self.resize(origin, width, me.height);
        Some(left)
    }

    fn merge_right(&mut self, pos: BlockPos) -> Option<BlockPos> {
        let me = self.state(pos)?;
        let right = self.neighbour(pos, me.width, 0, Lookup::Force)?;
        let other = self.state(right)?;
        if other.y_index != 0 || other.height != me.height {
            return None;
        }
        let width = me.width + other.width;
        if width > self.config.max_width {
            return None;
        }

        let origin = self.neighbour(pos, 0, 0, Lookup::Force)?;
        debug!(%pos, %origin, width, height = me.height, "merging right");
        self.resize(origin, width, me.height);
        Some(pos)
    }

    fn merge_up(&mut self, pos: BlockPos) -> Option<BlockPos> {
        let me = self.state(pos)?;
        let above = self.neighbour(pos, 0, me.height, Lookup::Force)?;
        let other = self.state(above)?;
        if other.x_index != 0 || other.width != me.width {
            return None;
        }
        let height = me.height + other.height;
        if height > self.config.max_height {
            return None;
        }

        let origin = self.neighbour(pos, 0, 0, Lookup::Force)?;
        debug!(%pos, %origin, width = me.width, height, "merging up");
        self.resize(origin, me.width, height);
        Some(pos)
    }

    fn merge_down(&mut self, pos: BlockPos) -> Option<BlockPos> {
        let me = self.state(pos)?;
        let below = self.neighbour(pos, 0, -1, Lookup::Force)?;
        let other = self.state(below)?;
        if other.x_index != 0 || other.width != me.width {
            return None;
        }
        let height = me.height + other.height;
        if height > self.config.max_height {
            return None;
        }

        let origin = self.neighbour(below, 0, 0, Lookup::Force)?;
        debug!(%pos, %origin, width = me.width, height, "merging down");
        self.resize(origin, me.width, height);
        Some(below)
    }

    // ── Contract ─────────────────────────────────────────────────────────

    /// Split the cluster containing `pos` into the rectangles that are still
    /// fully populated, then let each of them merge again.
    ///
    /// The first gap in row-major order decides the cut: rows before it stay
    /// with the old origin, the runs either side of it on its row become
    /// their own clusters, and the rows after it form the last piece. A
    /// piece with another gap in it is cut again the same way.
    pub fn contract(&mut self, pos: BlockPos) {
        let Some(state) = self.state(pos) else {
            return;
        };
        let Some(origin) = self.neighbour(pos, 0, 0, Lookup::Force) else {
            self.contract_orphan(pos, state);
            return;
        };

        let rotation = state.rotation;
        let whole = Span::new(0, 0, state.width, state.height);
        if self.first_gap(origin, rotation, whole).is_none() {
            return;
        }

        let mut work = vec![whole];
        let mut pieces = Vec::new();
        while let Some(span) = work.pop() {
            if let Some((hx, hy)) = self.first_gap(origin, rotation, span) {
                work.extend(span.split_around(hx, hy).into_iter().rev());
            } else {
                let start = rotation.step(origin, span.x, span.y);
                self.resize(start, span.w, span.h);
                pieces.push(start);
            }
        }

        debug!(%origin, pieces = pieces.len(), "contracted cluster");
        for piece in pieces {
            self.expand(piece);
        }
    }

    /// No origin to measure against: peel off the first row and the rest
    /// below it, using the cells next to `pos`.
    fn contract_orphan(&mut self, pos: BlockPos, state: MonitorState) {
        let right = if state.width > 1 {
            self.neighbour(pos, 1, 0, Lookup::Force)
        } else {
            None
        };
        let below = if state.height > 1 {
            self.neighbour(pos, 0, 1, Lookup::Force)
        } else {
            None
        };
        debug!(%pos, ?right, ?below, "contracting cluster without an origin");

        if let Some(right) = right {
            self.resize(right, state.width - 1, 1);
        }
        if let Some(below) = below {
            self.resize(below, state.width, state.height - 1);
        }
        if let Some(right) = right {
            self.expand(right);
        }
        if let Some(below) = below {
            self.expand(below);
        }
    }

    fn first_gap(&mut self, origin: BlockPos, rotation: Rotation, span: Span) -> Option<(i32, i32)> {
        for y in span.y..span.y + span.h {
            for x in span.x..span.x + span.w {
                let target = rotation.step(origin, x, y);
                if self.similar_at(origin, target, Lookup::Force).is_none() {
                    return Some((x, y));
                }
            }
        }
        None
    }

    /// Contract the direct neighbours of `pos` within its cluster while
    /// `pos` itself is hidden from lookups. Called before `pos` changes
    /// geometry or leaves the world.
    pub fn contract_neighbours(&mut self, pos: BlockPos) {
        let Some(state) = self.state(pos) else {
            return;
        };
        let (x, y) = (state.x_index, state.y_index);
        let around = [
            (x > 0).then_some((x - 1, y)),
            (x + 1 < state.width).then_some((x + 1, y)),
            (y > 0).then_some((x, y - 1)),
            (y + 1 < state.height).then_some((x, y + 1)),
        ];

        self.visiting(pos, |this| {
            for (nx, ny) in around.into_iter().flatten() {
                if let Some(neighbour) = this.neighbour(pos, nx, ny, Lookup::Force) {
                    this.contract(neighbour);
                }
            }
        });
    }

    /// Run `f` with the cell at `pos` marked as visiting.
    fn visiting<R>(&mut self, pos: BlockPos, f: impl FnOnce(&mut Self) -> R) -> R {
        if let Some(monitor) = self.world.monitor_mut(pos) {
            monitor.visiting = true;
        }
        let result = f(self);
        if let Some(monitor) = self.world.monitor_mut(pos) {
            monitor.visiting = false;
        }
        result
    }
}
