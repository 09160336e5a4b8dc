// SPDX-License-Identifier: MIT
//
// n-term colour system — sixteen indexed colours and a mutable palette.
//
// Monitor terminals never store RGB in their cells. Each cell carries two
// indices into a 16-entry palette (foreground and background), which keeps
// cells tiny, makes diffs cheap, and lets a program recolour the whole
// screen by editing a single palette entry.
//
// Indices are fixed: programs and persisted screens refer to colours by
// index, so the order of `Colour` must never change.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Colour ──────────────────────────────────────────────────────────────────

/// One of the sixteen indexed terminal colours.
///
/// # Examples
///
/// ```
/// use n_term::color::Colour;
///
/// assert_eq!(Colour::Red.index(), 14);
/// assert_eq!(Colour::from_index(14), Some(Colour::Red));
/// assert_eq!(Colour::from_index(16), None);
/// assert_eq!(Colour::Red.to_string(), "e");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Colour {
    #[default]
    White = 0,
    Orange = 1,
    Magenta = 2,
    LightBlue = 3,
    Yellow = 4,
    Lime = 5,
    Pink = 6,
    Gray = 7,
    LightGray = 8,
    Cyan = 9,
    Purple = 10,
    Blue = 11,
    Brown = 12,
    Green = 13,
    Red = 14,
    Black = 15,
}

impl Colour {
    /// All colours in index order.
    pub const ALL: [Self; 16] = [
        Self::White,
        Self::Orange,
        Self::Magenta,
        Self::LightBlue,
        Self::Yellow,
        Self::Lime,
        Self::Pink,
        Self::Gray,
        Self::LightGray,
        Self::Cyan,
        Self::Purple,
        Self::Blue,
        Self::Brown,
        Self::Green,
        Self::Red,
        Self::Black,
    ];

    /// Palette index (0–15).
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Colour for a palette index, or `None` if out of range.
    #[inline]
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < 16 { Some(Self::ALL[index]) } else { None }
    }
}

/// Lowercase hex digit of the index.
impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.index())
    }
}

// ─── Rgb ─────────────────────────────────────────────────────────────────────

/// A 24-bit palette entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    #[inline]
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// From a packed `0xRRGGBB` value.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_u32(packed: u32) -> Self {
        Self {
            r: (packed >> 16) as u8,
            g: (packed >> 8) as u8,
            b: packed as u8,
        }
    }

    /// Packed `0xRRGGBB`.
    #[inline]
    #[must_use]
    pub const fn to_u32(self) -> u32 {
        (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.to_u32())
    }
}

// ─── Palette ─────────────────────────────────────────────────────────────────

const DEFAULT_PALETTE: [u32; 16] = [
    0x00F0_F0F0, // white
    0x00F2_B233, // orange
    0x00E5_7FD8, // magenta
    0x0099_B2F2, // light blue
    0x00DE_DE6C, // yellow
    0x007F_CC19, // lime
    0x00F2_B2CC, // pink
    0x004C_4C4C, // gray
    0x0099_9999, // light gray
    0x004C_99B2, // cyan
    0x00B2_66E5, // purple
    0x0033_66CC, // blue
    0x007F_664C, // brown
    0x0057_A64E, // green
    0x00CC_4C4C, // red
    0x0011_1111, // black
];

/// The sixteen RGB values the colour indices resolve to.
///
/// # Examples
///
/// ```
/// use n_term::color::{Colour, Palette, Rgb};
///
/// let mut palette = Palette::default();
/// assert_eq!(palette.get(Colour::Black), Rgb::from_u32(0x111111));
///
/// palette.set(Colour::Black, Rgb::new(0, 0, 0));
/// assert_eq!(palette.get(Colour::Black), Rgb::new(0, 0, 0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    entries: [Rgb; 16],
}

impl Palette {
    /// The palette every terminal starts with.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DEFAULT_PALETTE.map(Rgb::from_u32),
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, colour: Colour) -> Rgb {
        self.entries[colour as usize]
    }

    #[inline]
    pub const fn set(&mut self, colour: Colour, rgb: Rgb) {
        self.entries[colour as usize] = rgb;
    }

    /// Restore the default entries.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Entries in index order.
    #[inline]
    #[must_use]
    pub const fn entries(&self) -> &[Rgb; 16] {
        &self.entries
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
