//! Monitor configuration.
//!
//! Everything here has a sensible default, so a config file only needs to
//! name what it changes:
//!
//! ```toml
//! max_width = 8
//! max_height = 6
//! render_border = 0.125
//! ```
//!
//! | Key             | Default   | Meaning                                         |
//! |-----------------|-----------|-------------------------------------------------|
//! | `max_width`     | 8         | Cluster width limit, 1 to 8 blocks              |
//! | `max_height`    | 6         | Cluster height limit, 1 to 6 blocks             |
//! | `render_border` | 2/16      | Frame around the screen; touches here are ignored |
//! | `render_margin` | 0.5/16    | Padding between frame and text                  |
//! | `pixel_scale`   | 1/64      | Block units per font pixel at text scale 1      |
//! | `font_width`    | 6         | Glyph width in font pixels                      |
//! | `font_height`   | 9         | Glyph height in font pixels                     |

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

/// Widest cluster any configuration may allow, in blocks.
pub const WIDTH_CAP: i32 = 8;
/// Tallest cluster any configuration may allow, in blocks.
pub const HEIGHT_CAP: i32 = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub max_width: i32,
    pub max_height: i32,
    pub render_border: f64,
    pub render_margin: f64,
    pub pixel_scale: f64,
    pub font_width: f64,
    pub font_height: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_width: WIDTH_CAP,
            max_height: HEIGHT_CAP,
            render_border: 2.0 / 16.0,
            render_margin: 0.5 / 16.0,
            pixel_scale: 1.0 / 64.0,
            font_width: 6.0,
            font_height: 9.0,
        }
    }
}

impl MonitorConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Toml`] on malformed input or unknown keys, and
    /// [`MonitorError::InvalidConfig`] if a value is out of range.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    ///
    /// # Errors
    ///
    /// As [`from_toml_str`](Self::from_toml_str), plus [`MonitorError::Io`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check that every value describes a usable monitor.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidConfig`] naming the first bad key.
    pub fn validate(&self) -> Result<()> {
        if !(1..=WIDTH_CAP).contains(&self.max_width) {
            return Err(MonitorError::config(format!(
                "max_width must be between 1 and {WIDTH_CAP}"
            )));
        }
        if !(1..=HEIGHT_CAP).contains(&self.max_height) {
            return Err(MonitorError::config(format!(
                "max_height must be between 1 and {HEIGHT_CAP}"
            )));
        }
        if self.render_border < 0.0 || self.render_margin < 0.0 {
            return Err(MonitorError::config("render_border and render_margin must not be negative"));
        }
        // A 1×1 monitor must keep some screen between its borders.
        if self.inset() >= 0.5 {
            return Err(MonitorError::config(
                "render_border + render_margin must be less than 0.5",
            ));
        }
        if self.pixel_scale <= 0.0 || self.font_width <= 0.0 || self.font_height <= 0.0 {
            return Err(MonitorError::config(
                "pixel_scale, font_width and font_height must be positive",
            ));
        }
        Ok(())
    }

    /// Distance from a cluster's outer edge to its first character.
    #[inline]
    #[must_use]
    pub fn inset(&self) -> f64 {
        self.render_border + self.render_margin
    }
}
