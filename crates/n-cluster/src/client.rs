//! The observer's copy of clusters and terminals.
//!
//! A replica only ever changes in response to a [`ClientMessage`]. Origins
//! hold a [`TerminalBuffer`] rebuilt from the snapshots and patches they
//! receive; every other cell finds its terminal by deriving its origin
//! from index and rotation, caching the answer until its own geometry
//! changes.
//!
//! Terminal state the replica cannot use turns into a request for the cell
//! to be described again.

use n_term::TerminalBuffer;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::geometry::{BlockPos, ChunkPos};
use crate::monitor::MonitorState;
use crate::sync::ClientMessage;

#[derive(Debug)]
struct ReplicaMonitor {
    state: MonitorState,
    terminal: Option<TerminalBuffer>,
    origin: Option<BlockPos>,
}

/// Every monitor cell an observer knows about.
#[derive(Debug, Default)]
pub struct ReplicaWorld {
    monitors: FxHashMap<BlockPos, ReplicaMonitor>,
    full_requests: Vec<BlockPos>,
}

impl ReplicaWorld {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one message from the authoritative side.
    pub fn apply(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Geometry { pos, state } => self.apply_geometry(pos, state),
            ClientMessage::Removed { pos } => {
                self.monitors.remove(&pos);
            }
            ClientMessage::Terminal { pos, update } => {
                let Some(monitor) = self.monitors.get_mut(&pos) else {
                    warn!(%pos, "terminal state for unknown monitor, requesting resync");
                    self.request_full(pos);
                    return;
                };
                if !monitor.state.is_origin() {
                    warn!(%pos, "terminal state for non-origin monitor, requesting resync");
                    self.request_full(pos);
                    return;
                }
                let terminal = monitor
                    .terminal
                    .get_or_insert_with(|| TerminalBuffer::new(0, 0));
                if let Err(err) = terminal.apply(update) {
                    warn!(%pos, %err, "rejected terminal update, requesting snapshot");
                    self.request_full(pos);
                }
            }
        }
    }

    fn request_full(&mut self, pos: BlockPos) {
        if !self.full_requests.contains(&pos) {
            self.full_requests.push(pos);
        }
    }

    fn apply_geometry(&mut self, pos: BlockPos, state: MonitorState) {
        let monitor = self.monitors.entry(pos).or_insert(ReplicaMonitor {
            state,
            terminal: None,
            origin: None,
        });
        let old = monitor.state;
        monitor.state = state;

        let moved = (old.x_index, old.y_index) != (state.x_index, state.y_index);
        if moved {
            if old.is_origin() && monitor.terminal.take().is_some() {
                debug!(%pos, "released terminal of former origin");
            }
            monitor.origin = None;
        }
        if old.rotation != state.rotation {
            monitor.origin = None;
        }
        if state.is_origin() && monitor.terminal.is_none() {
            monitor.terminal = Some(TerminalBuffer::new(0, 0));
        }
    }

    /// Geometry of the cell at `pos`.
    #[must_use]
    pub fn state(&self, pos: BlockPos) -> Option<MonitorState> {
        self.monitors.get(&pos).map(|m| m.state)
    }

    /// The terminal shown by the cell at `pos`, found through its origin.
    pub fn terminal(&mut self, pos: BlockPos) -> Option<&TerminalBuffer> {
        let origin = self.origin(pos)?;
        self.monitors.get(&origin)?.terminal.as_ref()
    }

    /// The origin of `pos`'s cluster, if it is known and agrees.
    pub fn origin(&mut self, pos: BlockPos) -> Option<BlockPos> {
        let monitor = self.monitors.get(&pos)?;
        let state = monitor.state;
        let candidate = monitor.origin.unwrap_or_else(|| state.origin_of(pos));

        let agrees = self
            .monitors
            .get(&candidate)
            .is_some_and(|o| state.agrees_with_origin(pos, candidate, &o.state));
        let monitor = self.monitors.get_mut(&pos)?;
        if agrees {
            monitor.origin = Some(candidate);
            Some(candidate)
        } else {
            monitor.origin = None;
            None
        }
    }

    /// Cells whose geometry and terminal must be resent. Clears the list.
    pub fn take_full_requests(&mut self) -> Vec<BlockPos> {
        std::mem::take(&mut self.full_requests)
    }

    /// Forget every cell in `chunk`, releasing the terminals of its origins.
    pub fn unload_chunk(&mut self, chunk: ChunkPos) {
        self.monitors.retain(|pos, _| pos.chunk() != chunk);
        self.full_requests.retain(|pos| pos.chunk() != chunk);
    }

    /// Number of known cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }
}
