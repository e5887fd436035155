//! Karaoke subtitle style.

use serde::{Deserialize, Serialize};

use crate::error::{StageError, StageResult};

/// ASS color in ABGR format.
///
/// ASS uses &HAABBGGRR format (alpha, blue, green, red).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// Alpha component (0 = opaque, 255 = transparent).
    pub a: u8,
}

impl AssColor {
    /// Create from RGB values (alpha = 0, opaque).
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0 }
    }

    /// Parse an HTML-style `#RRGGBB` color.
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().strip_prefix('#')?;
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let value = u32::from_str_radix(hex, 16).ok()?;
        Some(Self::from_rgb(
            ((value >> 16) & 0xFF) as u8,
            ((value >> 8) & 0xFF) as u8,
            (value & 0xFF) as u8,
        ))
    }

    /// Convert to ASS color string (&HAABBGGRR).
    pub fn to_ass_string(&self) -> String {
        format!(
            "&H{:02X}{:02X}{:02X}{:02X}",
            self.a, self.b, self.g, self.r
        )
    }
}

/// Font, size and colors of the karaoke track.
///
/// Colors are `#RRGGBB` strings as entered by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleStyle {
    pub font: String,
    pub size: u32,
    /// Color of words not yet sung.
    pub upcoming_color: String,
    /// Color of words being or already sung.
    pub highlight_color: String,
    pub outline_color: String,
    pub shadow_color: String,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font: "Arial".to_string(),
            size: 30,
            upcoming_color: "#FFFFFF".to_string(),
            highlight_color: "#FF69B4".to_string(),
            outline_color: "#000000".to_string(),
            shadow_color: "#000000".to_string(),
        }
    }
}

/// A style with colors resolved for writing.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStyle {
    pub font: String,
    pub size: u32,
    pub upcoming: AssColor,
    pub highlight: AssColor,
    pub outline: AssColor,
    pub shadow: AssColor,
}

impl SubtitleStyle {
    /// Validate the style and parse its colors.
    pub fn resolve(&self) -> StageResult<ResolvedStyle> {
        if self.font.trim().is_empty() {
            return Err(StageError::invalid_parameter("subtitle font is empty"));
        }
        // Style lines are comma separated, one per line
        if self.font.contains(',') || self.font.chars().any(char::is_control) {
            return Err(StageError::invalid_parameter(format!(
                "subtitle font '{}' contains a comma or control character",
                self.font.escape_default()
            )));
        }
        if self.size == 0 {
            return Err(StageError::invalid_parameter("subtitle size must be > 0"));
        }

        let color = |field: &str, value: &str| {
            AssColor::from_hex(value).ok_or_else(|| {
                StageError::invalid_parameter(format!(
                    "{} '{}' is not a #RRGGBB color",
                    field, value
                ))
            })
        };

        Ok(ResolvedStyle {
            font: self.font.trim().to_string(),
            size: self.size,
            upcoming: color("upcoming_color", &self.upcoming_color)?,
            highlight: color("highlight_color", &self.highlight_color)?,
            outline: color("outline_color", &self.outline_color)?,
            shadow: color("shadow_color", &self.shadow_color)?,
        })
    }
}
