//! Monitor cells and the engine handle that operates on them.
//!
//! A [`Monitor`] is one display block. Its persisted part, [`MonitorState`],
//! says where it sits in its cluster: `(x_index, y_index)` within a
//! `width × height` rectangle, plus the shared rotation. Everything about
//! the cluster is derived from these five integers. There is no cluster
//! record anywhere; "who is my origin" is always answered by walking
//! `-x_index` steps right and `-y_index` steps down and looking at what is
//! there.
//!
//! [`Monitors`] borrows a world and a config and hosts the engine. Its
//! methods are spread over the modules that own each concern:
//! membership (merge/contract), server (terminal ownership and ticks) and
//! touch (input mapping). This module provides the lookups they share.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::MonitorConfig;
use crate::device::DeviceId;
use crate::geometry::{Aabb, BlockPos, Rotation};
use crate::server::ServerMonitor;
use crate::world::MonitorWorld;

// ---------------------------------------------------------------------------
// MonitorState
// ---------------------------------------------------------------------------

/// The persisted and replicated geometry of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorState {
    pub x_index: i32,
    pub y_index: i32,
    pub width: i32,
    pub height: i32,
    #[serde(rename = "dir")]
    pub rotation: Rotation,
}

impl MonitorState {
    /// An unclustered cell: 1×1 at index (0, 0).
    #[must_use]
    pub const fn single(rotation: Rotation) -> Self {
        Self {
            x_index: 0,
            y_index: 0,
            width: 1,
            height: 1,
            rotation,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_origin(&self) -> bool {
        self.x_index == 0 && self.y_index == 0
    }

    /// Whether the index lies inside the dimensions.
    #[must_use]
    pub const fn index_in_bounds(&self) -> bool {
        self.x_index >= 0
            && self.y_index >= 0
            && self.x_index < self.width
            && self.y_index < self.height
    }

    /// World position of cluster index `(x, y)`, seen from the cell at `pos`.
    #[inline]
    #[must_use]
    pub const fn position_of(&self, pos: BlockPos, x: i32, y: i32) -> BlockPos {
        self.rotation.step(pos, x - self.x_index, y - self.y_index)
    }

    /// World position of this cell's origin.
    #[inline]
    #[must_use]
    pub const fn origin_of(&self, pos: BlockPos) -> BlockPos {
        self.position_of(pos, 0, 0)
    }

    /// Whether `other`, found at `other_pos`, is the origin this state
    /// (at `pos`) points to.
    #[must_use]
    pub fn agrees_with_origin(&self, pos: BlockPos, other_pos: BlockPos, other: &Self) -> bool {
        self.origin_of(pos) == other_pos
            && other.is_origin()
            && other.width == self.width
            && other.height == self.height
            && other.rotation == self.rotation
    }
}

// ---------------------------------------------------------------------------
// Kind / Monitor
// ---------------------------------------------------------------------------

/// Monitor variant. Only cells of the same kind merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Kind {
    #[default]
    Normal,
    /// Colour terminal, accepts touch input.
    Advanced,
}

impl Kind {
    #[must_use]
    pub const fn is_colour(self) -> bool {
        matches!(self, Self::Advanced)
    }
}

/// What survives an unload: kind and geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorRecord {
    pub kind: Kind,
    pub state: MonitorState,
}

/// One monitor cell.
#[derive(Debug)]
pub struct Monitor {
    pub(crate) kind: Kind,
    pub(crate) state: MonitorState,
    pub(crate) devices: BTreeSet<DeviceId>,
    /// Set once something wraps this cell as a device. A cluster keeps a
    /// terminal only while at least one member has this set.
    pub(crate) peripheral: bool,
    /// Present only on an origin, and only once something needs it.
    pub(crate) server: Option<ServerMonitor>,
    /// Excluded from neighbour lookups for the duration of a
    /// neighbour contraction. Never persisted.
    pub(crate) visiting: bool,
    /// Set when the cell is being removed. Never persisted.
    pub(crate) destroyed: bool,
}

impl Monitor {
    /// A fresh, unclustered cell.
    #[must_use]
    pub const fn new(kind: Kind, rotation: Rotation) -> Self {
        Self::from_record(MonitorRecord {
            kind,
            state: MonitorState::single(rotation),
        })
    }

    #[must_use]
    pub const fn from_record(record: MonitorRecord) -> Self {
        Self {
            kind: record.kind,
            state: record.state,
            devices: BTreeSet::new(),
            peripheral: false,
            server: None,
            visiting: false,
            destroyed: false,
        }
    }

    #[must_use]
    pub const fn record(&self) -> MonitorRecord {
        MonitorRecord {
            kind: self.kind,
            state: self.state,
        }
    }

    #[inline]
    #[must_use]
    pub const fn kind(&self) -> Kind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub const fn state(&self) -> &MonitorState {
        &self.state
    }

    #[must_use]
    pub const fn devices(&self) -> &BTreeSet<DeviceId> {
        &self.devices
    }

    #[must_use]
    pub const fn is_peripheral(&self) -> bool {
        self.peripheral
    }

    /// The authoritative terminal owner, if this is an origin that has one.
    #[must_use]
    pub const fn server(&self) -> Option<&ServerMonitor> {
        self.server.as_ref()
    }

    fn is_similar_to(&self, other: &Self) -> bool {
        !other.visiting
            && !other.destroyed
            && other.state.rotation == self.state.rotation
            && other.kind == self.kind
    }
}

// ---------------------------------------------------------------------------
// Monitors
// ---------------------------------------------------------------------------

/// Whether a lookup may force an unloaded region to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    /// Unloaded means absent.
    Loaded,
    /// Load whatever is needed. Structural operations only.
    Force,
}

/// The cluster engine, borrowing a world and a config.
///
/// # Examples
///
/// ```
/// use n_cluster::config::MonitorConfig;
/// use n_cluster::geometry::{BlockPos, Rotation};
/// use n_cluster::monitor::{Kind, Monitors};
/// use n_cluster::world::GridWorld;
///
/// let mut world = GridWorld::new();
/// let config = MonitorConfig::default();
/// let mut monitors = Monitors::new(&mut world, &config);
///
/// let r = Rotation::NORTH; // right is west
/// monitors.place(BlockPos::new(0, 0, 0), Kind::Normal, r);
/// monitors.place(BlockPos::new(-1, 0, 0), Kind::Normal, r);
///
/// let state = monitors.state(BlockPos::new(-1, 0, 0)).unwrap();
/// assert_eq!((state.x_index, state.width), (1, 2));
/// ```
pub struct Monitors<'a, W: MonitorWorld + ?Sized> {
    pub(crate) world: &'a mut W,
    pub(crate) config: &'a MonitorConfig,
}

impl<'a, W: MonitorWorld + ?Sized> Monitors<'a, W> {
    pub fn new(world: &'a mut W, config: &'a MonitorConfig) -> Self {
        Self { world, config }
    }

    #[must_use]
    pub fn world(&self) -> &W {
        &*self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut *self.world
    }

    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        self.config
    }

    /// Geometry of the loaded cell at `pos`.
    #[must_use]
    pub fn state(&self, pos: BlockPos) -> Option<MonitorState> {
        self.world.monitor(pos).map(|m| m.state)
    }

    // ── Lookups ──────────────────────────────────────────────────────────

    /// The cell at `pos` if it can join `me`'s cluster. `me` is always
    /// similar to itself, even while visiting or destroyed.
    pub(crate) fn similar(&self, me: BlockPos, pos: BlockPos) -> Option<MonitorState> {
        let mine = self.world.monitor(me)?;
        if pos == me {
            return Some(mine.state);
        }
        let other = self.world.monitor(pos)?;
        mine.is_similar_to(other).then_some(other.state)
    }

    /// [`similar`](Self::similar), loading `pos`'s region first if allowed.
    pub(crate) fn similar_at(
        &mut self,
        me: BlockPos,
        pos: BlockPos,
        lookup: Lookup,
    ) -> Option<MonitorState> {
        if !self.world.is_loaded(pos) && (lookup == Lookup::Loaded || !self.world.load(pos)) {
            return None;
        }
        self.similar(me, pos)
    }

    /// Position of the similar cell at cluster index `(x, y)` as seen from `me`.
    pub(crate) fn neighbour(
        &mut self,
        me: BlockPos,
        x: i32,
        y: i32,
        lookup: Lookup,
    ) -> Option<BlockPos> {
        let target = self.world.monitor(me)?.state.position_of(me, x, y);
        self.similar_at(me, target, lookup).map(|_| target)
    }

    /// Non-loading [`neighbour`](Self::neighbour) usable through `&self`.
    pub(crate) fn neighbour_loaded(&self, me: BlockPos, x: i32, y: i32) -> Option<BlockPos> {
        let target = self.world.monitor(me)?.state.position_of(me, x, y);
        self.similar(me, target).map(|_| target)
    }

    /// Position of the origin of `pos`'s cluster, if it is loaded.
    #[must_use]
    pub fn origin(&self, pos: BlockPos) -> Option<BlockPos> {
        self.neighbour_loaded(pos, 0, 0)
    }

    /// Loaded member positions of `pos`'s cluster, row by row from index
    /// (0, 0).
    #[must_use]
    pub fn members(&self, pos: BlockPos) -> Vec<BlockPos> {
        let Some(state) = self.state(pos) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for y in 0..state.height {
            for x in 0..state.width {
                if let Some(member) = self.neighbour_loaded(pos, x, y) {
                    out.push(member);
                }
            }
        }
        out
    }

    /// World-space bounds of `pos`'s cluster; the cell itself if either
    /// corner is not reachable.
    #[must_use]
    pub fn bounds(&self, pos: BlockPos) -> Aabb {
        let Some(state) = self.state(pos) else {
            return Aabb::unit(pos);
        };
        let start = self.neighbour_loaded(pos, 0, 0);
        let end = self.neighbour_loaded(pos, state.width - 1, state.height - 1);
        match (start, end) {
            (Some(start), Some(end)) => Aabb::spanning(start, end),
            _ => Aabb::unit(pos),
        }
    }
}
