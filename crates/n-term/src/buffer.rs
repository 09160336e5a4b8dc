// SPDX-License-Identifier: MIT
//
// TerminalBuffer — the character grid a monitor cluster displays.
//
// Every character position on a monitor is a cell in this buffer. Programs
// write text at a cursor, scroll, clear and recolour; replicas on the other
// end of the connection receive either a full snapshot or a patch of just
// the cells that changed.
//
// Design:
//
//   - Flat `Vec<Cell>` with row-major indexing, exactly like a frame buffer.
//     A row's cells are contiguous, so run extraction for patches is a
//     linear scan.
//
//   - Every mutation bumps a monotonically increasing `version` and stamps
//     each touched cell with it (a parallel `Vec<u64>`). "What changed since
//     version v" is then a scan for stamps greater than v. No change log, no
//     per-observer copies of the previous frame.
//
//   - `layout_version` records the version of the last resize. A diff
//     against anything older cannot be expressed as a patch (the grid is a
//     different shape) and degrades to a full snapshot.
//
//   - Cursor, colours and palette are "meta" state with a single stamp,
//     `meta_version`. They are tiny, so they are sent whole whenever they
//     changed.
//
// Memory:
//
//   The largest cluster (8×6 blocks at text scale 0.5) is 164×81 cells,
//   13,284 cells × (12-byte cell + 8-byte stamp) ≈ 260 KB. No concern.

use crate::cell::{Cell, sanitize};
use crate::color::{Colour, Palette, Rgb};

/// A 2D grid of character cells with a cursor, colours and a palette.
///
/// # Examples
///
/// ```
/// use n_term::buffer::TerminalBuffer;
///
/// let mut term = TerminalBuffer::new(10, 3);
/// term.set_cursor(2, 1);
/// term.write("hi");
///
/// assert_eq!(term.row_text(1).unwrap(), "  hi      ");
/// assert_eq!(term.cursor(), (4, 1));
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct TerminalBuffer {
    width: u16,
    height: u16,
    cells: Vec<Cell>,
    stamps: Vec<u64>,

    version: u64,
    layout_version: u64,
    meta_version: u64,

    cursor_x: i32,
    cursor_y: i32,
    cursor_blink: bool,
    text_colour: Colour,
    background_colour: Colour,
    palette: Palette,
}

impl TerminalBuffer {
    // ─── Construction ────────────────────────────────────────────────────

    /// Create a blank terminal at version 0.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        let size = usize::from(width) * usize::from(height);
        Self {
            width,
            height,
            cells: vec![Cell::EMPTY; size],
            stamps: vec![0; size],
            version: 0,
            layout_version: 0,
            meta_version: 0,
            cursor_x: 0,
            cursor_y: 0,
            cursor_blink: false,
            text_colour: Colour::White,
            background_colour: Colour::Black,
            palette: Palette::new(),
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    /// Width in columns.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> u16 {
        self.width
    }

    /// Height in rows.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> u16 {
        self.height
    }

    /// `(width, height)`.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    /// Version of the most recent mutation.
    #[inline]
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Version at which the grid last changed shape.
    #[inline]
    #[must_use]
    pub const fn layout_version(&self) -> u64 {
        self.layout_version
    }

    /// Version at which cursor, colours or palette last changed.
    #[inline]
    #[must_use]
    pub const fn meta_version(&self) -> u64 {
        self.meta_version
    }

    /// Cursor position `(x, y)`, 0-indexed. May lie outside the grid.
    #[inline]
    #[must_use]
    pub const fn cursor(&self) -> (i32, i32) {
        (self.cursor_x, self.cursor_y)
    }

    #[inline]
    #[must_use]
    pub const fn cursor_blink(&self) -> bool {
        self.cursor_blink
    }

    #[inline]
    #[must_use]
    pub const fn text_colour(&self) -> Colour {
        self.text_colour
    }

    #[inline]
    #[must_use]
    pub const fn background_colour(&self) -> Colour {
        self.background_colour
    }

    #[inline]
    #[must_use]
    pub const fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Whether `(x, y)` is within the grid.
    #[inline]
    #[must_use]
    pub const fn in_bounds(&self, x: u16, y: u16) -> bool {
        x < self.width && y < self.height
    }

    #[inline]
    const fn index(&self, x: u16, y: u16) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// The raw cell slice.
    #[inline]
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Per-cell modification stamps, parallel to [`cells`](Self::cells).
    #[inline]
    #[must_use]
    pub(crate) fn stamps(&self) -> &[u64] {
        &self.stamps
    }

    /// A single row as a slice. Returns `None` if `y` is out of bounds.
    #[inline]
    #[must_use]
    pub fn row(&self, y: u16) -> Option<&[Cell]> {
        if y < self.height {
            let start = self.index(0, y);
            Some(&self.cells[start..start + usize::from(self.width)])
        } else {
            None
        }
    }

    /// The characters of row `y` as a string.
    #[must_use]
    pub fn row_text(&self, y: u16) -> Option<String> {
        self.row(y).map(|row| row.iter().map(|c| c.ch).collect())
    }

    // ─── Direct Cell Access ──────────────────────────────────────────────

    /// Read the cell at `(x, y)`, or `None` if out of bounds.
    #[inline]
    #[must_use]
    pub fn read_char(&self, x: u16, y: u16) -> Option<Cell> {
        if self.in_bounds(x, y) {
            Some(self.cells[self.index(x, y)])
        } else {
            None
        }
    }

    /// Write a cell directly. Returns `true` if the position was in bounds.
    ///
    /// Writing a cell equal to the current one is a no-op and does not
    /// bump the version.
    pub fn write_char(&mut self, x: u16, y: u16, cell: Cell) -> bool {
        if !self.in_bounds(x, y) {
            return false;
        }
        let idx = self.index(x, y);
        let cell = Cell { ch: sanitize(cell.ch), ..cell };
        if self.cells[idx] != cell {
            let version = self.bump();
            self.cells[idx] = cell;
            self.stamps[idx] = version;
        }
        true
    }

    // ─── Cursor Writes ───────────────────────────────────────────────────

    /// Write text at the cursor in the current colours and advance it.
    ///
    /// Characters falling outside the grid are dropped but still advance
    /// the cursor, so a program can write a line that starts off-screen.
    pub fn write(&mut self, text: &str) {
        let count = i32::try_from(text.chars().count()).unwrap_or(i32::MAX);
        if let Ok(y) = u16::try_from(self.cursor_y) {
            if y < self.height {
                let version = self.bump();
                let (fg, bg) = (self.text_colour, self.background_colour);
                let mut x = self.cursor_x;
                for ch in text.chars() {
                    if let Ok(col) = u16::try_from(x) {
                        if col < self.width {
                            let idx = self.index(col, y);
                            self.cells[idx] = Cell::styled(ch, fg, bg);
                            self.stamps[idx] = version;
                        }
                    }
                    x = x.saturating_add(1);
                }
            }
        }
        self.cursor_x = self.cursor_x.saturating_add(count);
        self.touch_meta();
    }

    /// Move the cursor. Positions outside the grid are allowed.
    pub fn set_cursor(&mut self, x: i32, y: i32) {
        if (x, y) != (self.cursor_x, self.cursor_y) {
            self.cursor_x = x;
            self.cursor_y = y;
            self.touch_meta();
        }
    }

    pub fn set_cursor_blink(&mut self, blink: bool) {
        if blink != self.cursor_blink {
            self.cursor_blink = blink;
            self.touch_meta();
        }
    }

    pub fn set_text_colour(&mut self, colour: Colour) {
        if colour != self.text_colour {
            self.text_colour = colour;
            self.touch_meta();
        }
    }

    pub fn set_background_colour(&mut self, colour: Colour) {
        if colour != self.background_colour {
            self.background_colour = colour;
            self.touch_meta();
        }
    }

    pub fn set_palette_colour(&mut self, colour: Colour, rgb: Rgb) {
        if self.palette.get(colour) != rgb {
            self.palette.set(colour, rgb);
            self.touch_meta();
        }
    }

    // ─── Clear, Scroll & Resize ──────────────────────────────────────────

    /// Fill the whole grid with spaces in the current colours.
    pub fn clear(&mut self) {
        let blank = self.blank();
        let version = self.bump();
        self.cells.fill(blank);
        self.stamps.fill(version);
    }

    /// Fill the cursor's row with spaces in the current colours.
    pub fn clear_line(&mut self) {
        let Ok(y) = u16::try_from(self.cursor_y) else {
            return;
        };
        if y >= self.height {
            return;
        }
        let blank = self.blank();
        let version = self.bump();
        let start = self.index(0, y);
        let end = start + usize::from(self.width);
        self.cells[start..end].fill(blank);
        self.stamps[start..end].fill(version);
    }

    /// Shift content up by `lines` (down if negative), filling the exposed
    /// rows with spaces in the current colours.
    pub fn scroll(&mut self, lines: i32) {
        if lines == 0 || self.cells.is_empty() {
            return;
        }
        let width = usize::from(self.width);
        let height = i32::from(self.height);
        let blank = self.blank();
        let shifted: Vec<Cell> = (0..height)
            .flat_map(|y| {
                let src = y + lines;
                let row: Vec<Cell> = if (0..height).contains(&src) {
                    let start = usize::try_from(src).unwrap_or(0) * width;
                    self.cells[start..start + width].to_vec()
                } else {
                    vec![blank; width]
                };
                row
            })
            .collect();
        let version = self.bump();
        self.cells = shifted;
        self.stamps.fill(version);
    }

    /// Resize the grid, clearing all content.
    ///
    /// After resize the cursor is kept (it may now be off-grid) and every
    /// diff against an older version degrades to a full snapshot.
    pub fn resize(&mut self, width: u16, height: u16) {
        let size = usize::from(width) * usize::from(height);
        let version = self.bump();
        self.width = width;
        self.height = height;
        self.cells.clear();
        self.cells.resize(size, Cell::EMPTY);
        self.stamps.clear();
        self.stamps.resize(size, version);
        self.layout_version = version;
        self.meta_version = version;
    }

    // ─── Internals ───────────────────────────────────────────────────────

    fn blank(&self) -> Cell {
        Cell::styled(' ', self.text_colour, self.background_colour)
    }

    fn bump(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    fn touch_meta(&mut self) {
        self.meta_version = self.bump();
    }

    /// Overwrite every field from a received state. Used by snapshot and
    /// patch application, which live next to the wire types.
    pub(crate) fn replace_all(
        &mut self,
        version: u64,
        width: u16,
        height: u16,
        cells: Vec<Cell>,
        meta: crate::diff::Meta,
    ) {
        let size = cells.len();
        self.width = width;
        self.height = height;
        self.cells = cells;
        self.stamps = vec![version; size];
        self.version = version;
        self.layout_version = version;
        self.set_meta(meta, version);
    }

    pub(crate) fn set_meta(&mut self, meta: crate::diff::Meta, version: u64) {
        self.cursor_x = meta.cursor.0;
        self.cursor_y = meta.cursor.1;
        self.cursor_blink = meta.cursor_blink;
        self.text_colour = meta.text_colour;
        self.background_colour = meta.background_colour;
        self.palette = meta.palette;
        self.meta_version = version;
    }

    pub(crate) fn meta(&self) -> crate::diff::Meta {
        crate::diff::Meta {
            cursor: (self.cursor_x, self.cursor_y),
            cursor_blink: self.cursor_blink,
            text_colour: self.text_colour,
            background_colour: self.background_colour,
            palette: self.palette,
        }
    }

    /// Write a received run of cells, stamping them with `version`.
    pub(crate) fn put_run(&mut self, x: u16, y: u16, cells: &[Cell], version: u64) -> bool {
        let Ok(len) = u16::try_from(cells.len()) else {
            return false;
        };
        if y >= self.height || u32::from(x) + u32::from(len) > u32::from(self.width) {
            return false;
        }
        let start = self.index(x, y);
        self.cells[start..start + cells.len()].copy_from_slice(cells);
        self.stamps[start..start + cells.len()].fill(version);
        true
    }

    pub(crate) const fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl std::fmt::Debug for TerminalBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TerminalBuffer({}x{} @v{})",
            self.width, self.height, self.version
        )
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────────
