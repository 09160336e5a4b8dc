//! The world cell lookup the cluster engine runs against.
//!
//! The engine never owns cells. It asks a [`MonitorWorld`] for the cell at a
//! position, mutates it in place, and tells the world which cells need their
//! geometry re-sent to replicas. Lookups may land in an unloaded region;
//! structural operations are allowed to force it to load, everything else
//! treats it as "not there right now" and tries again next tick.
//!
//! [`GridWorld`] is the in-memory implementation: cells grouped by 16×16
//! chunk columns, with explicit unload (cells persisted as
//! [`MonitorRecord`]s) and load (cells restored from those records).

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::geometry::{BlockPos, ChunkPos};
use crate::monitor::{Monitor, MonitorRecord};

/// Cell storage and loading, as seen by the cluster engine.
pub trait MonitorWorld {
    /// Whether the region containing `pos` is loaded.
    fn is_loaded(&self, pos: BlockPos) -> bool;

    /// Force the region containing `pos` to load. Returns whether it is
    /// loaded afterwards.
    fn load(&mut self, pos: BlockPos) -> bool;

    /// The cell at `pos`, if its region is loaded and it holds a monitor.
    fn monitor(&self, pos: BlockPos) -> Option<&Monitor>;

    fn monitor_mut(&mut self, pos: BlockPos) -> Option<&mut Monitor>;

    /// Put a cell at `pos`, loading its region. Returns the previous cell.
    fn insert(&mut self, pos: BlockPos, monitor: Monitor) -> Option<Monitor>;

    fn remove(&mut self, pos: BlockPos) -> Option<Monitor>;

    /// Record that the cell at `pos` changed geometry (or vanished).
    fn mark_updated(&mut self, pos: BlockPos);

    /// Positions recorded by [`mark_updated`](Self::mark_updated) since the
    /// last drain, oldest first, without duplicates.
    fn drain_updated(&mut self) -> Vec<BlockPos>;

    /// Loaded monitor positions in `chunk`, sorted.
    fn monitors_in_chunk(&self, chunk: ChunkPos) -> Vec<BlockPos>;

    /// All loaded monitor positions, sorted.
    fn loaded_monitors(&self) -> Vec<BlockPos>;
}

// ---------------------------------------------------------------------------
// GridWorld
// ---------------------------------------------------------------------------

/// In-memory world of monitor cells.
///
/// A chunk counts as loaded unless it was explicitly unloaded; regions
/// nobody has touched are simply empty.
#[derive(Debug, Default)]
pub struct GridWorld {
    chunks: FxHashMap<ChunkPos, FxHashMap<BlockPos, Monitor>>,
    stored: FxHashMap<ChunkPos, Vec<(BlockPos, MonitorRecord)>>,
    updated: Vec<BlockPos>,
    updated_set: FxHashSet<BlockPos>,
    forced_loads: usize,
}

impl GridWorld {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_chunk_loaded(&self, chunk: ChunkPos) -> bool {
        !self.stored.contains_key(&chunk)
    }

    /// Persist every cell in `chunk` and drop it from memory.
    ///
    /// Terminals and attached devices do not survive; geometry does.
    /// Returns the positions that were unloaded.
    pub fn unload_chunk(&mut self, chunk: ChunkPos) -> Vec<BlockPos> {
        let cells = self.chunks.remove(&chunk).unwrap_or_default();
        let mut records: Vec<(BlockPos, MonitorRecord)> = cells
            .into_iter()
            .map(|(pos, monitor)| (pos, monitor.record()))
            .collect();
        records.sort_by_key(|(pos, _)| *pos);
        let positions = records.iter().map(|(pos, _)| *pos).collect();
        trace!(?chunk, count = records.len(), "unloaded chunk");
        self.stored.entry(chunk).or_default().extend(records);
        positions
    }

    /// Restore a previously unloaded chunk. Returns the restored positions.
    ///
    /// Restored cells keep their persisted geometry unchecked; run
    /// [`Monitors::on_load`](crate::monitor::Monitors::on_load) on them to
    /// validate it.
    pub fn load_chunk(&mut self, chunk: ChunkPos) -> Vec<BlockPos> {
        let Some(records) = self.stored.remove(&chunk) else {
            return Vec::new();
        };
        let cells = self.chunks.entry(chunk).or_default();
        let mut positions = Vec::with_capacity(records.len());
        for (pos, record) in records {
            cells.insert(pos, Monitor::from_record(record));
            positions.push(pos);
        }
        trace!(?chunk, count = positions.len(), "loaded chunk");
        positions
    }

    /// How many times a lookup forced an unloaded chunk to load.
    #[must_use]
    pub const fn forced_loads(&self) -> usize {
        self.forced_loads
    }

    /// Number of loaded cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.values().map(FxHashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MonitorWorld for GridWorld {
    fn is_loaded(&self, pos: BlockPos) -> bool {
        self.is_chunk_loaded(pos.chunk())
    }

    fn load(&mut self, pos: BlockPos) -> bool {
        let chunk = pos.chunk();
        if !self.is_chunk_loaded(chunk) {
            self.forced_loads += 1;
            self.load_chunk(chunk);
        }
        true
    }

    fn monitor(&self, pos: BlockPos) -> Option<&Monitor> {
        self.chunks.get(&pos.chunk())?.get(&pos)
    }

    fn monitor_mut(&mut self, pos: BlockPos) -> Option<&mut Monitor> {
        self.chunks.get_mut(&pos.chunk())?.get_mut(&pos)
    }

    fn insert(&mut self, pos: BlockPos, monitor: Monitor) -> Option<Monitor> {
        self.load(pos);
        self.chunks.entry(pos.chunk()).or_default().insert(pos, monitor)
    }

    fn remove(&mut self, pos: BlockPos) -> Option<Monitor> {
        let chunk = self.chunks.get_mut(&pos.chunk())?;
        let removed = chunk.remove(&pos);
        if chunk.is_empty() {
            self.chunks.remove(&pos.chunk());
        }
        removed
    }

    fn mark_updated(&mut self, pos: BlockPos) {
        if self.updated_set.insert(pos) {
            self.updated.push(pos);
        }
    }

    fn drain_updated(&mut self) -> Vec<BlockPos> {
        self.updated_set.clear();
        std::mem::take(&mut self.updated)
    }

    fn monitors_in_chunk(&self, chunk: ChunkPos) -> Vec<BlockPos> {
        let mut positions: Vec<BlockPos> = self
            .chunks
            .get(&chunk)
            .map(|cells| cells.keys().copied().collect())
            .unwrap_or_default();
        positions.sort_unstable();
        positions
    }

    fn loaded_monitors(&self) -> Vec<BlockPos> {
        let mut positions: Vec<BlockPos> = self
            .chunks
            .values()
            .flat_map(|cells| cells.keys().copied())
            .collect();
        positions.sort_unstable();
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rotation;
    use crate::monitor::{Kind, MonitorState};

    fn cell() -> Monitor {
        Monitor::new(Kind::Normal, Rotation::NORTH)
    }

    #[test]
    fn untouched_regions_are_loaded_and_empty() {
        let world = GridWorld::new();
        let pos = BlockPos::new(100, 5, -300);
        assert!(world.is_loaded(pos));
        assert!(world.monitor(pos).is_none());
        assert!(world.is_empty());
    }

    #[test]
    fn insert_and_remove() {
        let mut world = GridWorld::new();
        let pos = BlockPos::new(1, 2, 3);
        assert!(world.insert(pos, cell()).is_none());
        assert!(world.monitor(pos).is_some());
        assert_eq!(world.len(), 1);
        assert!(world.remove(pos).is_some());
        assert!(world.monitor(pos).is_none());
    }

    #[test]
    fn unload_hides_cells_and_load_restores_geometry() {
        let mut world = GridWorld::new();
        let pos = BlockPos::new(3, 0, 0);
        let mut monitor = cell();
        monitor.state = MonitorState {
            x_index: 1,
            y_index: 0,
            width: 2,
            height: 1,
            rotation: Rotation::NORTH,
        };
        world.insert(pos, monitor);

        assert_eq!(world.unload_chunk(pos.chunk()), vec![pos]);
        assert!(!world.is_loaded(pos));
        assert!(world.monitor(pos).is_none());

        assert_eq!(world.load_chunk(pos.chunk()), vec![pos]);
        let restored = world.monitor(pos).unwrap();
        assert_eq!(restored.state().x_index, 1);
        assert_eq!(restored.state().width, 2);
    }

    #[test]
    fn forced_load_is_counted() {
        let mut world = GridWorld::new();
        let pos = BlockPos::new(40, 0, 40);
        world.insert(pos, cell());
        world.unload_chunk(pos.chunk());

        assert!(world.load(pos));
        assert_eq!(world.forced_loads(), 1);
        assert!(world.monitor(pos).is_some());

        // Already loaded: nothing to force.
        world.load(pos);
        assert_eq!(world.forced_loads(), 1);
    }

    #[test]
    fn updated_positions_are_deduplicated_in_order() {
        let mut world = GridWorld::new();
        let (a, b) = (BlockPos::new(0, 0, 0), BlockPos::new(1, 0, 0));
        world.mark_updated(b);
        world.mark_updated(a);
        world.mark_updated(b);
        assert_eq!(world.drain_updated(), vec![b, a]);
        assert!(world.drain_updated().is_empty());
    }

    #[test]
    fn monitors_in_chunk_are_sorted() {
        let mut world = GridWorld::new();
        for x in [5, 1, 3] {
            world.insert(BlockPos::new(x, 0, 0), cell());
        }
        world.insert(BlockPos::new(20, 0, 0), cell());
        assert_eq!(
            world.monitors_in_chunk(ChunkPos::new(0, 0)),
            vec![
                BlockPos::new(1, 0, 0),
                BlockPos::new(3, 0, 0),
                BlockPos::new(5, 0, 0),
            ]
        );
        assert_eq!(world.loaded_monitors().len(), 4);
    }
}
