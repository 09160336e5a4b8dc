//! Pushing cluster geometry and terminal content to observers.
//!
//! Observers (remote clients) watch chunks. Whatever the world marks as
//! updated is sent as a geometry message to everyone watching that cell's
//! chunk; terminals queued by [`Monitors::tick`](crate::monitor::Monitors::tick)
//! are sent afterwards, in the same flush. That order is what keeps a
//! replica from receiving a diff for dimensions it does not know yet.
//!
//! A terminal whose resize has not yet been reported to devices by a tick
//! stays queued: content for the new dimensions is never delivered before
//! the resize event.
//!
//! Per observer and origin the watcher remembers the last terminal version
//! it sent, so each payload is the diff since then, or a full snapshot when
//! there is nothing to diff against. Delivery is unreliable; a replica that
//! missed something asks again through [`Watcher::request_full`], and an
//! observer that lost a whole flush is brought back with [`Watcher::resync`].

use std::collections::BTreeMap;

use n_term::Update;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::geometry::{BlockPos, ChunkPos};
use crate::monitor::MonitorState;
use crate::server::SyncFlags;
use crate::world::MonitorWorld;

/// A connected observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObserverId(pub u32);

/// What the authoritative side tells a replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// The cell at `pos` now has this geometry.
    Geometry { pos: BlockPos, state: MonitorState },
    /// The cell at `pos` is gone.
    Removed { pos: BlockPos },
    /// New terminal content for the origin at `pos`.
    Terminal { pos: BlockPos, update: Update },
}

/// A message addressed to one observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub observer: ObserverId,
    pub message: ClientMessage,
}

#[derive(Debug, Default)]
struct Observer {
    chunks: FxHashSet<ChunkPos>,
    /// Last terminal version sent, per origin.
    sent: FxHashMap<BlockPos, u64>,
    /// Cells to describe on the next flush.
    pending: Vec<BlockPos>,
}

impl Observer {
    fn watches(&self, pos: BlockPos) -> bool {
        self.chunks.contains(&pos.chunk())
    }

    fn describe(&mut self, pos: BlockPos) {
        if !self.pending.contains(&pos) {
            self.pending.push(pos);
        }
    }
}

/// Collects terminal updates and fans them out to observers.
#[derive(Debug, Default)]
pub struct Watcher {
    queue: Vec<BlockPos>,
    queued: FxHashSet<BlockPos>,
    observers: BTreeMap<ObserverId, Observer>,
}

impl Watcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start sending `chunk` to `observer`: every cell in it is described on
    /// the next flush and every terminal in it is sent in full.
    pub fn watch_chunk<W: MonitorWorld + ?Sized>(
        &mut self,
        observer: ObserverId,
        chunk: ChunkPos,
        world: &W,
    ) {
        let state = self.observers.entry(observer).or_default();
        if !state.chunks.insert(chunk) {
            return;
        }
        self.describe_chunk(observer, chunk, world);
    }

    /// Describe everything `observer` watches again, with full terminal
    /// snapshots, as if it had just started watching. Used after the
    /// observer lost messages it cannot name, such as a whole flush.
    pub fn resync<W: MonitorWorld + ?Sized>(&mut self, observer: ObserverId, world: &W) {
        let Some(state) = self.observers.get_mut(&observer) else {
            return;
        };
        let mut chunks: Vec<ChunkPos> = state.chunks.iter().copied().collect();
        chunks.sort_unstable();
        debug!(?observer, chunks = chunks.len(), "resynchronising observer");
        for chunk in chunks {
            self.describe_chunk(observer, chunk, world);
        }
    }

    fn describe_chunk<W: MonitorWorld + ?Sized>(
        &mut self,
        observer: ObserverId,
        chunk: ChunkPos,
        world: &W,
    ) {
        let Some(state) = self.observers.get_mut(&observer) else {
            return;
        };
        let mut origins = Vec::new();
        for pos in world.monitors_in_chunk(chunk) {
            state.describe(pos);
            state.sent.remove(&pos);
            let has_terminal = world
                .monitor(pos)
                .is_some_and(|m| m.state().is_origin() && m.server().is_some());
            if has_terminal {
                origins.push(pos);
            }
        }
        trace!(?observer, ?chunk, origins = origins.len(), "describing chunk");
        for pos in origins {
            self.enqueue(pos);
        }
    }

    /// Stop sending `chunk` to `observer`.
    pub fn unwatch_chunk(&mut self, observer: ObserverId, chunk: ChunkPos) {
        let Some(state) = self.observers.get_mut(&observer) else {
            return;
        };
        state.chunks.remove(&chunk);
        state.sent.retain(|pos, _| pos.chunk() != chunk);
        state.pending.retain(|pos| pos.chunk() != chunk);
        if state.chunks.is_empty() {
            self.observers.remove(&observer);
        }
    }

    /// Forget everything about `observer`.
    pub fn remove_observer(&mut self, observer: ObserverId) {
        self.observers.remove(&observer);
    }

    /// Send `observer` the geometry of `pos` and, if it is an origin, a full
    /// snapshot of its terminal on the next flush. Typically because a patch
    /// did not apply or arrived for a cell the replica does not know.
    pub fn request_full(&mut self, observer: ObserverId, pos: BlockPos) {
        let Some(state) = self.observers.get_mut(&observer) else {
            return;
        };
        if !state.watches(pos) {
            return;
        }
        state.describe(pos);
        state.sent.remove(&pos);
        self.enqueue(pos);
    }

    /// Queue the terminal of the origin at `pos`. Queuing twice before a
    /// flush sends once.
    pub fn enqueue(&mut self, pos: BlockPos) {
        if self.queued.insert(pos) {
            self.queue.push(pos);
        }
    }

    /// Origins queued for the next flush, in queue order.
    #[must_use]
    pub fn queued(&self) -> Vec<BlockPos> {
        self.queue.clone()
    }

    /// Everything due since the last flush: geometry first, then terminals.
    ///
    /// A queued origin that has since stopped being an origin, lost its
    /// terminal or left the world is dropped. One whose resize is still
    /// unreported stays queued for the flush after the next tick.
    pub fn flush<W: MonitorWorld + ?Sized>(&mut self, world: &mut W) -> Vec<Outgoing> {
        let mut out = Vec::new();

        for pos in world.drain_updated() {
            let monitor = world.monitor(pos);
            let message = monitor.map_or(ClientMessage::Removed { pos }, |m| {
                ClientMessage::Geometry {
                    pos,
                    state: *m.state(),
                }
            });
            let has_terminal =
                monitor.is_some_and(|m| m.state().is_origin() && m.server().is_some());

            for (&id, state) in &mut self.observers {
                if !state.watches(pos) {
                    continue;
                }
                state.sent.remove(&pos);
                state.pending.retain(|p| *p != pos);
                out.push(Outgoing {
                    observer: id,
                    message: message.clone(),
                });
            }
            if has_terminal {
                self.enqueue(pos);
            }
        }

        for (&id, state) in &mut self.observers {
            for pos in std::mem::take(&mut state.pending) {
                let message = world.monitor(pos).map_or(ClientMessage::Removed { pos }, |m| {
                    ClientMessage::Geometry {
                        pos,
                        state: *m.state(),
                    }
                });
                out.push(Outgoing {
                    observer: id,
                    message,
                });
            }
        }

        self.queued.clear();
        let mut held = Vec::new();
        for pos in std::mem::take(&mut self.queue) {
            let server = world
                .monitor(pos)
                .filter(|m| m.state().is_origin())
                .and_then(|m| m.server());
            let Some(server) = server else {
                trace!(%pos, "dropping terminal update for vanished origin");
                continue;
            };
            if server.flags().contains(SyncFlags::RESIZED) {
                trace!(%pos, "holding terminal update until the resize is reported");
                held.push(pos);
                continue;
            }
            let terminal = server.terminal();

            for (&id, state) in &mut self.observers {
                if !state.watches(pos) {
                    continue;
                }
                let update = match state.sent.get(&pos) {
                    Some(&version) => terminal.diff_since(version),
                    None => Update::Full(terminal.full_snapshot()),
                };
                if matches!(&update, Update::Patch(patch) if patch.is_empty()) {
                    continue;
                }
                state.sent.insert(pos, terminal.version());
                out.push(Outgoing {
                    observer: id,
                    message: ClientMessage::Terminal { pos, update },
                });
            }
        }

        for pos in held {
            self.enqueue(pos);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::MonitorConfig;
    use crate::device::{DeviceEvent, DeviceId};
    use crate::geometry::Rotation;
    use crate::monitor::{Kind, Monitors};
    use crate::world::GridWorld;

    const ALICE: ObserverId = ObserverId(1);
    const BOB: ObserverId = ObserverId(2);

    /// North-facing wall cells, all inside chunk (0, 0).
    fn at(x: i32, y: i32) -> BlockPos {
        BlockPos::new(8 - x, y, 8)
    }

    /// Report pending resizes and queue changed terminals.
    fn settle(world: &mut GridWorld, config: &MonitorConfig, watcher: &mut Watcher) {
        let mut sink: Vec<(DeviceId, DeviceEvent)> = Vec::new();
        Monitors::new(world, config).tick_all(&mut sink, watcher);
    }

    fn kinds(out: &[Outgoing]) -> Vec<&'static str> {
        out.iter()
            .map(|o| match &o.message {
                ClientMessage::Geometry { .. } => "geometry",
                ClientMessage::Removed { .. } => "removed",
                ClientMessage::Terminal { update, .. } if update.is_full() => "full",
                ClientMessage::Terminal { .. } => "patch",
            })
            .collect()
    }

    #[test]
    fn enqueue_coalesces() {
        let mut watcher = Watcher::new();
        watcher.enqueue(at(0, 0));
        watcher.enqueue(at(1, 0));
        watcher.enqueue(at(0, 0));
        assert_eq!(watcher.queued(), vec![at(0, 0), at(1, 0)]);
    }

    #[test]
    fn watching_sends_geometry_then_full_terminal() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        let mut monitors = Monitors::new(&mut world, &config);
        monitors.place(at(0, 0), Kind::Normal, Rotation::NORTH);
        monitors.terminal_mut(at(0, 0)).unwrap().write("hello");
        world.drain_updated();

        let mut watcher = Watcher::new();
        settle(&mut world, &config, &mut watcher);
        watcher.watch_chunk(ALICE, at(0, 0).chunk(), &world);
        let out = watcher.flush(&mut world);
        assert_eq!(kinds(&out), vec!["geometry", "full"]);
    }

    #[test]
    fn later_flushes_send_patches_and_nothing_when_idle() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        let mut monitors = Monitors::new(&mut world, &config);
        monitors.place(at(0, 0), Kind::Normal, Rotation::NORTH);
        monitors.wrap_peripheral(at(0, 0));

        let mut watcher = Watcher::new();
        settle(&mut world, &config, &mut watcher);
        watcher.watch_chunk(ALICE, at(0, 0).chunk(), &world);
        watcher.flush(&mut world);

        Monitors::new(&mut world, &config)
            .terminal_mut(at(0, 0))
            .unwrap()
            .write("hi");
        watcher.enqueue(at(0, 0));
        let out = watcher.flush(&mut world);
        assert_eq!(kinds(&out), vec!["patch"]);

        watcher.enqueue(at(0, 0));
        assert!(watcher.flush(&mut world).is_empty());
    }

    #[test]
    fn only_watchers_of_the_chunk_hear_about_it() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        let far = BlockPos::new(100, 0, 100);
        let mut monitors = Monitors::new(&mut world, &config);
        monitors.place(at(0, 0), Kind::Normal, Rotation::NORTH);

        let mut watcher = Watcher::new();
        watcher.watch_chunk(ALICE, at(0, 0).chunk(), &world);
        watcher.watch_chunk(BOB, far.chunk(), &world);
        let out = watcher.flush(&mut world);

        assert!(out.iter().all(|o| o.observer == ALICE));
        assert_eq!(kinds(&out), vec!["geometry"]);
    }

    #[test]
    fn geometry_is_flushed_before_terminal_content() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        let mut watcher = Watcher::new();
        let mut sink: Vec<(DeviceId, DeviceEvent)> = Vec::new();
        let mut monitors = Monitors::new(&mut world, &config);
        monitors.place(at(0, 0), Kind::Normal, Rotation::NORTH);
        monitors.attach_device(at(0, 0), DeviceId(1));
        monitors.tick(at(0, 0), &mut sink, &mut watcher);
        watcher.watch_chunk(ALICE, at(0, 0).chunk(), &world);
        watcher.flush(&mut world);

        let mut monitors = Monitors::new(&mut world, &config);
        monitors.place(at(1, 0), Kind::Normal, Rotation::NORTH);
        monitors.tick(at(0, 0), &mut sink, &mut watcher);
        let out = watcher.flush(&mut world);

        assert_eq!(kinds(&out), vec!["geometry", "geometry", "full"]);
    }

    #[test]
    fn removed_origins_are_announced_and_their_updates_dropped() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        let mut monitors = Monitors::new(&mut world, &config);
        monitors.place(at(0, 0), Kind::Normal, Rotation::NORTH);
        monitors.wrap_peripheral(at(0, 0));

        let mut watcher = Watcher::new();
        settle(&mut world, &config, &mut watcher);
        watcher.watch_chunk(ALICE, at(0, 0).chunk(), &world);
        watcher.flush(&mut world);

        watcher.enqueue(at(0, 0));
        Monitors::new(&mut world, &config).remove(at(0, 0));
        let out = watcher.flush(&mut world);

        assert_eq!(
            out,
            vec![Outgoing {
                observer: ALICE,
                message: ClientMessage::Removed { pos: at(0, 0) },
            }]
        );
    }

    #[test]
    fn requesting_full_resends_snapshot() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        Monitors::new(&mut world, &config).place(at(0, 0), Kind::Normal, Rotation::NORTH);
        Monitors::new(&mut world, &config).wrap_peripheral(at(0, 0));

        let mut watcher = Watcher::new();
        settle(&mut world, &config, &mut watcher);
        watcher.watch_chunk(ALICE, at(0, 0).chunk(), &world);
        watcher.flush(&mut world);

        watcher.request_full(ALICE, at(0, 0));
        assert_eq!(kinds(&watcher.flush(&mut world)), vec!["geometry", "full"]);
    }

    #[test]
    fn requesting_a_vanished_cell_announces_its_removal() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        Monitors::new(&mut world, &config).place(at(0, 0), Kind::Normal, Rotation::NORTH);

        let mut watcher = Watcher::new();
        watcher.watch_chunk(ALICE, at(0, 0).chunk(), &world);
        watcher.flush(&mut world);

        watcher.request_full(ALICE, at(3, 0));
        watcher.request_full(BOB, at(0, 0));
        assert_eq!(
            watcher.flush(&mut world),
            vec![Outgoing {
                observer: ALICE,
                message: ClientMessage::Removed { pos: at(3, 0) },
            }]
        );
    }

    #[test]
    fn resync_describes_everything_again() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        let mut monitors = Monitors::new(&mut world, &config);
        monitors.place(at(0, 0), Kind::Normal, Rotation::NORTH);
        monitors.place(at(3, 0), Kind::Normal, Rotation::NORTH);
        monitors.wrap_peripheral(at(3, 0));

        let mut watcher = Watcher::new();
        settle(&mut world, &config, &mut watcher);
        watcher.watch_chunk(ALICE, at(0, 0).chunk(), &world);
        watcher.flush(&mut world);
        assert!(watcher.flush(&mut world).is_empty());

        watcher.resync(ALICE, &world);
        watcher.resync(BOB, &world);
        let out = watcher.flush(&mut world);
        assert!(out.iter().all(|o| o.observer == ALICE));
        assert_eq!(kinds(&out), vec!["geometry", "geometry", "full"]);
    }

    #[test]
    fn content_waits_until_the_resize_is_reported() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        let mut watcher = Watcher::new();
        let mut sink: Vec<(DeviceId, DeviceEvent)> = Vec::new();
        let mut monitors = Monitors::new(&mut world, &config);
        monitors.place(at(0, 0), Kind::Normal, Rotation::NORTH);
        monitors.attach_device(at(0, 0), DeviceId(1));
        monitors.terminal_mut(at(0, 0)).unwrap().write("hi");
        monitors.tick(at(0, 0), &mut sink, &mut watcher);
        watcher.watch_chunk(ALICE, at(0, 0).chunk(), &world);

        // Grows to 2×1 between the tick and the flush.
        Monitors::new(&mut world, &config).place(at(1, 0), Kind::Normal, Rotation::NORTH);
        let out = watcher.flush(&mut world);
        assert_eq!(kinds(&out), vec!["geometry", "geometry"]);
        assert_eq!(watcher.queued(), vec![at(0, 0)]);

        sink.clear();
        Monitors::new(&mut world, &config).tick(at(0, 0), &mut sink, &mut watcher);
        assert_eq!(
            sink,
            vec![(DeviceId(1), DeviceEvent::Resize { cols: 18, rows: 5 })]
        );
        let out = watcher.flush(&mut world);
        assert_eq!(kinds(&out), vec!["full"]);
        let ClientMessage::Terminal {
            update: Update::Full(snapshot),
            ..
        } = &out[0].message
        else {
            panic!("expected a full snapshot");
        };
        assert_eq!((snapshot.width, snapshot.height), (18, 5));
    }

    #[test]
    fn unwatching_stops_updates() {
        let mut world = GridWorld::new();
        let config = MonitorConfig::default();
        Monitors::new(&mut world, &config).place(at(0, 0), Kind::Normal, Rotation::NORTH);

        let mut watcher = Watcher::new();
        watcher.watch_chunk(ALICE, at(0, 0).chunk(), &world);
        watcher.unwatch_chunk(ALICE, at(0, 0).chunk());
        assert!(watcher.flush(&mut world).is_empty());
    }

    #[test]
    fn messages_serialize() {
        let message = ClientMessage::Geometry {
            pos: at(1, 2),
            state: MonitorState::single(Rotation::NORTH),
        };
        let json = serde_json::to_string(&message).unwrap();
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }
}
