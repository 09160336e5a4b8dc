// SPDX-License-Identifier: MIT
//
// Terminal diffs — what a replica needs to catch up.
//
// A replica holds a copy of the authoritative terminal that is only ever
// changed by applying what it receives. Two kinds of update exist:
//
//   - `Snapshot`: dimensions, every cell, and the meta state (cursor,
//     colours, palette). Sent when a replica first attaches, when it asks
//     for one, or when the grid changed shape since the replica's version.
//
//   - `Patch`: horizontal runs of cells stamped after the replica's version,
//     plus the meta state if it changed. Most ticks touch one or two rows,
//     so a patch is usually a handful of short runs.
//
// Patches carry the version they were computed against (`base`). The
// connection is lossy and may reorder, so a replica refuses any patch whose
// base is not exactly its own version. The caller then requests a full
// snapshot. A patch is never half-applied: every run is validated before
// the first cell is written.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buffer::TerminalBuffer;
use crate::cell::Cell;
use crate::color::{Colour, Palette};

// ─── Wire types ──────────────────────────────────────────────────────────────

/// Cursor, colour and palette state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub cursor: (i32, i32),
    pub cursor_blink: bool,
    pub text_colour: Colour,
    pub background_colour: Colour,
    pub palette: Palette,
}

/// The complete state of a terminal at `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u64,
    pub width: u16,
    pub height: u16,
    /// Row-major, `width * height` entries.
    pub cells: Vec<Cell>,
    pub meta: Meta,
}

/// A horizontal run of changed cells starting at `(x, y)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub x: u16,
    pub y: u16,
    pub cells: Vec<Cell>,
}

/// The changes between version `base` and version `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub base: u64,
    pub version: u64,
    pub runs: Vec<Run>,
    pub meta: Option<Meta>,
}

impl Patch {
    /// Whether applying this patch changes nothing but the version.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty() && self.meta.is_none()
    }

    /// Total cells carried by all runs.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.runs.iter().map(|r| r.cells.len()).sum()
    }
}

/// Either a full snapshot or an incremental patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Update {
    Full(Snapshot),
    Patch(Patch),
}

impl Update {
    /// The version a replica is at after applying this update.
    #[must_use]
    pub const fn version(&self) -> u64 {
        match self {
            Self::Full(s) => s.version,
            Self::Patch(p) => p.version,
        }
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Why an update was refused. The terminal is unchanged in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("patch is based on version {base}, terminal is at version {current}")]
    VersionMismatch { base: u64, current: u64 },

    #[error("run at ({x}, {y}) with {len} cells does not fit a {width}x{height} terminal")]
    OutOfBounds {
        x: u16,
        y: u16,
        len: usize,
        width: u16,
        height: u16,
    },

    #[error("snapshot carries {actual} cells, a {width}x{height} terminal needs {expected}")]
    SnapshotSize {
        width: u16,
        height: u16,
        expected: usize,
        actual: usize,
    },
}

// ─── Diffing ─────────────────────────────────────────────────────────────────

impl TerminalBuffer {
    /// Capture the full state.
    #[must_use]
    pub fn full_snapshot(&self) -> Snapshot {
        Snapshot {
            version: self.version(),
            width: self.width(),
            height: self.height(),
            cells: self.cells().to_vec(),
            meta: self.meta(),
        }
    }

    /// Replace the whole state with a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::SnapshotSize`] if the cell count does not match
    /// the snapshot's dimensions.
    pub fn load_snapshot(&mut self, snapshot: Snapshot) -> Result<(), ApplyError> {
        let expected = usize::from(snapshot.width) * usize::from(snapshot.height);
        if snapshot.cells.len() != expected {
            return Err(ApplyError::SnapshotSize {
                width: snapshot.width,
                height: snapshot.height,
                expected,
                actual: snapshot.cells.len(),
            });
        }
        self.replace_all(
            snapshot.version,
            snapshot.width,
            snapshot.height,
            snapshot.cells,
            snapshot.meta,
        );
        Ok(())
    }

    /// Everything that changed after `version`.
    ///
    /// Degrades to a full snapshot when `version` predates the last resize
    /// or lies in this terminal's future (the replica saw a different
    /// history, e.g. a terminal that was discarded and recreated).
    #[must_use]
    pub fn diff_since(&self, version: u64) -> Update {
        if version < self.layout_version() || version > self.version() {
            return Update::Full(self.full_snapshot());
        }

        let width = usize::from(self.width());
        let mut runs = Vec::new();
        if width > 0 {
            for (y, (row, stamps)) in self
                .cells()
                .chunks(width)
                .zip(self.stamps().chunks(width))
                .enumerate()
            {
                collect_runs(row, stamps, version, y, &mut runs);
            }
        }

        let meta = (self.meta_version() > version).then(|| self.meta());

        Update::Patch(Patch {
            base: version,
            version: self.version(),
            runs,
            meta,
        })
    }

    /// Apply a received update.
    ///
    /// # Errors
    ///
    /// See [`load_snapshot`](Self::load_snapshot) and
    /// [`apply_patch`](Self::apply_patch).
    pub fn apply(&mut self, update: Update) -> Result<(), ApplyError> {
        match update {
            Update::Full(snapshot) => self.load_snapshot(snapshot),
            Update::Patch(patch) => self.apply_patch(&patch),
        }
    }

    /// Apply a patch computed against this terminal's current version.
    ///
    /// # Errors
    ///
    /// - [`ApplyError::VersionMismatch`] if `patch.base` is not our version.
    /// - [`ApplyError::OutOfBounds`] if any run does not fit the grid.
    pub fn apply_patch(&mut self, patch: &Patch) -> Result<(), ApplyError> {
        if patch.base != self.version() {
            return Err(ApplyError::VersionMismatch {
                base: patch.base,
                current: self.version(),
            });
        }

        // Validate everything first so a bad run leaves no partial write.
        for run in &patch.runs {
            let end = usize::from(run.x) + run.cells.len();
            if run.y >= self.height() || end > usize::from(self.width()) {
                return Err(ApplyError::OutOfBounds {
                    x: run.x,
                    y: run.y,
                    len: run.cells.len(),
                    width: self.width(),
                    height: self.height(),
                });
            }
        }

        for run in &patch.runs {
            self.put_run(run.x, run.y, &run.cells, patch.version);
        }
        if let Some(meta) = &patch.meta {
            self.set_meta(meta.clone(), patch.version);
        }
        self.set_version(patch.version);
        Ok(())
    }
}

/// Append one run per maximal stretch of cells stamped after `version`.
#[allow(clippy::cast_possible_truncation)]
fn collect_runs(row: &[Cell], stamps: &[u64], version: u64, y: usize, out: &mut Vec<Run>) {
    let mut x = 0;
    while x < row.len() {
        if stamps[x] <= version {
            x += 1;
            continue;
        }
        let start = x;
        while x < row.len() && stamps[x] > version {
            x += 1;
        }
        // Safe truncation: x and y index a grid whose sides are u16.
        out.push(Run {
            x: start as u16,
            y: y as u16,
            cells: row[start..x].to_vec(),
        });
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
