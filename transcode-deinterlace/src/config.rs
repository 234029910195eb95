//! Deinterlacer configuration.

use crate::error::{DeinterlaceError, Result};
use serde::{Deserialize, Serialize};

/// Which estimates the line filter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterMode {
    /// Edge-directed interpolation from the current frame only. No
    /// temporal window, so no priming delay.
    Spatial,
    /// Spatial estimate clamped by the previous and next frames.
    #[default]
    SpatialTemporal,
}

/// Output frames per input frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputRate {
    /// One frame per input frame.
    #[default]
    Single,
    /// One frame per field, each with half the input duration.
    Bob,
}

/// Field order used to pick the field to rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Parity {
    /// From the frame's top-field-first flag.
    #[default]
    Auto,
    /// Top field first.
    Top,
    /// Bottom field first.
    Bottom,
}

/// Motion-compensated refinement pass settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefineConfig {
    /// Higher is slower and searches further. 0..=3 are meaningful.
    pub quality: u32,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self { quality: 1 }
    }
}

impl RefineConfig {
    /// Horizontal displacement searched either side of the pixel.
    pub fn search_radius(&self) -> isize {
        1 + self.quality.min(3) as isize
    }

    /// Largest matching cost still trusted as the same content.
    pub fn max_cost(&self) -> i32 {
        24 * (self.quality.min(3) as i32 + 1)
    }
}

/// Deinterlacer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeinterlaceConfig {
    /// Filter mode.
    pub mode: FilterMode,
    /// Widen the temporal band with the two-rows-away check.
    pub spatial_check: bool,
    /// Output rate.
    pub rate: OutputRate,
    /// Field parity.
    pub parity: Parity,
    /// Filter both fields of every frame, keeping the second.
    pub two_pass: bool,
    /// Refinement pass, if any.
    pub refine: Option<RefineConfig>,
    /// Worker segments; `None` uses the available parallelism.
    pub segments: Option<usize>,
}

impl Default for DeinterlaceConfig {
    fn default() -> Self {
        Self {
            mode: FilterMode::SpatialTemporal,
            spatial_check: true,
            rate: OutputRate::Single,
            parity: Parity::Auto,
            two_pass: false,
            refine: None,
            segments: None,
        }
    }
}

/// `mode` bits of the settings string.
const MODE_TEMPORAL: i32 = 1;
const MODE_SPATIAL_CHECK: i32 = 2;
const MODE_TWO_PASS: i32 = 4;
const MODE_BOB: i32 = 8;

impl DeinterlaceConfig {
    /// Parse a `mode:parity:refine:quality` settings string.
    ///
    /// - `mode`: bit vector; 1 = temporal filter, 2 = spatial check,
    ///   4 = two-pass, 8 = bob. Without bit 1 the filter is spatial only.
    /// - `parity`: -1 = auto, even = top field first, odd = bottom first.
    /// - `refine`: -1 = off, anything else enables the refinement pass.
    /// - `quality`: refinement quality.
    ///
    /// Missing trailing fields keep `0:-1:-1:1`.
    pub fn from_settings(settings: &str) -> Result<Self> {
        let mut fields = [0i32, -1, -1, 1];
        let settings = settings.trim();
        if !settings.is_empty() {
            let parts: Vec<&str> = settings.split(':').collect();
            if parts.len() > fields.len() {
                return Err(DeinterlaceError::invalid_settings(format!(
                    "expected at most {} fields, got '{}'",
                    fields.len(),
                    settings
                )));
            }
            for (slot, part) in fields.iter_mut().zip(parts) {
                *slot = part.trim().parse().map_err(|_| {
                    DeinterlaceError::invalid_settings(format!("'{}' is not a number", part))
                })?;
            }
        }
        let [mode, parity, refine, quality] = fields;

        if !(0..=15).contains(&mode) {
            return Err(DeinterlaceError::invalid_settings(format!(
                "mode {} out of range",
                mode
            )));
        }
        if refine >= 0 && quality < 0 {
            return Err(DeinterlaceError::invalid_settings(format!(
                "negative refinement quality {}",
                quality
            )));
        }

        Ok(Self {
            mode: if mode & MODE_TEMPORAL != 0 {
                FilterMode::SpatialTemporal
            } else {
                FilterMode::Spatial
            },
            spatial_check: mode & MODE_SPATIAL_CHECK != 0,
            rate: if mode & MODE_BOB != 0 {
                OutputRate::Bob
            } else {
                OutputRate::Single
            },
            parity: match parity {
                p if p < 0 => Parity::Auto,
                p if p & 1 == 0 => Parity::Top,
                _ => Parity::Bottom,
            },
            two_pass: mode & MODE_TWO_PASS != 0,
            refine: (refine >= 0).then(|| RefineConfig {
                quality: quality as u32,
            }),
            segments: None,
        })
    }

    /// Set the filter mode.
    pub fn with_mode(mut self, mode: FilterMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable the spatial check.
    pub fn with_spatial_check(mut self, enabled: bool) -> Self {
        self.spatial_check = enabled;
        self
    }

    /// Set the output rate.
    pub fn with_rate(mut self, rate: OutputRate) -> Self {
        self.rate = rate;
        self
    }

    /// Set the parity.
    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Enable the refinement pass. Implies two-pass filtering.
    pub fn with_refine(mut self, refine: RefineConfig) -> Self {
        self.refine = Some(refine);
        self.two_pass = true;
        self
    }

    /// Set the number of worker segments.
    pub fn with_segments(mut self, segments: usize) -> Self {
        self.segments = Some(segments);
        self
    }

    /// Fields filtered per input frame.
    pub fn passes(&self) -> usize {
        if self.rate == OutputRate::Bob || self.two_pass {
            2
        } else {
            1
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.segments == Some(0) {
            return Err(DeinterlaceError::invalid_settings("segments must be >= 1"));
        }
        Ok(())
    }
}
