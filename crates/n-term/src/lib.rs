// SPDX-License-Identifier: MIT
//
// n-term — Terminal buffer for n-monitor.
//
// The character grid a monitor cluster displays: cells of one character
// and two palette indices, a cursor, current colours and a 16-entry
// palette. The grid is versioned. Every mutation bumps a counter and stamps
// the cells it touched, so the authoritative side can hand any replica
// exactly the cells it is missing, and a replica can tell when a patch does
// not follow from what it already has.
//
// Rasterizing cells to pixels is somebody else's job. This crate stops at
// "which character, which colours, where".

pub mod buffer;
pub mod cell;
pub mod color;
pub mod diff;

pub use buffer::TerminalBuffer;
pub use cell::Cell;
pub use color::{Colour, Palette, Rgb};
pub use diff::{ApplyError, Patch, Snapshot, Update};
