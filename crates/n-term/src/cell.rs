// SPDX-License-Identifier: MIT
//
// Cell — one character position on a monitor terminal.
//
// A cell is a character plus two palette indices. Nothing else: no
// attributes, no underline styles, no wide characters. Monitor fonts are
// fixed-width bitmap glyphs, one per cell, so anything that would occupy
// more or less than one column is replaced with `?` before it is stored.
//
// Cells are Copy and compare by value, which is all the diff engine needs.

use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthChar;

use crate::color::Colour;

/// Replacement for characters that cannot occupy exactly one column.
pub const REPLACEMENT: char = '?';

/// A single terminal cell.
///
/// # Examples
///
/// ```
/// use n_term::cell::Cell;
/// use n_term::color::Colour;
///
/// let cell = Cell::new('A').with_fg(Colour::Red);
/// assert_eq!(cell.ch, 'A');
/// assert_eq!(cell.fg, Colour::Red);
/// assert_eq!(cell.bg, Colour::Black);
///
/// // Wide characters do not fit a monitor cell.
/// assert_eq!(Cell::new('中').ch, '?');
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Character to display.
    pub ch: char,
    /// Foreground (text) colour.
    pub fg: Colour,
    /// Background colour.
    pub bg: Colour,
}

impl Cell {
    /// An empty cell: space, white on black.
    pub const EMPTY: Self = Self {
        ch: ' ',
        fg: Colour::White,
        bg: Colour::Black,
    };

    /// A cell with default colours. Non-single-width characters become `?`.
    #[inline]
    #[must_use]
    pub fn new(ch: char) -> Self {
        Self {
            ch: sanitize(ch),
            ..Self::EMPTY
        }
    }

    /// A cell with explicit colours.
    #[inline]
    #[must_use]
    pub fn styled(ch: char, fg: Colour, bg: Colour) -> Self {
        Self {
            ch: sanitize(ch),
            fg,
            bg,
        }
    }

    #[inline]
    #[must_use]
    pub const fn with_fg(self, fg: Colour) -> Self {
        Self { fg, ..self }
    }

    #[inline]
    #[must_use]
    pub const fn with_bg(self, bg: Colour) -> Self {
        Self { bg, ..self }
    }

    /// Whether this cell is a space with default colours.
    #[inline]
    #[must_use]
    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Map a character onto something a single cell can display.
#[inline]
#[must_use]
pub fn sanitize(ch: char) -> char {
    if ch.width() == Some(1) { ch } else { REPLACEMENT }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cell_is_default() {
        assert_eq!(Cell::default(), Cell::EMPTY);
        assert!(Cell::EMPTY.is_empty());
    }

    #[test]
    fn new_keeps_ascii() {
        assert_eq!(Cell::new('x').ch, 'x');
        assert!(!Cell::new('x').is_empty());
    }

    #[test]
    fn control_and_wide_chars_are_replaced() {
        assert_eq!(sanitize('\n'), REPLACEMENT);
        assert_eq!(sanitize('\u{0}'), REPLACEMENT);
        assert_eq!(sanitize('漢'), REPLACEMENT);
        assert_eq!(sanitize('é'), 'é');
    }

    #[test]
    fn styled_sets_both_colours() {
        let cell = Cell::styled('#', Colour::Lime, Colour::Blue);
        assert_eq!(cell.fg, Colour::Lime);
        assert_eq!(cell.bg, Colour::Blue);
    }

    #[test]
    fn coloured_space_is_not_empty() {
        assert!(!Cell::EMPTY.with_bg(Colour::Red).is_empty());
    }
}
