//! Matching calibration configuration
//!
//! Tolerances, point values, and thresholds are tuning parameters rather
//! than contracts, so they live in a TOML file instead of code.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/chit/config/matching.toml)
//! 2. Fall back to embedded defaults (compiled into binary)

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/matching.toml");

/// Tolerance for treating two amounts as exactly equal (half a cent)
pub const AMOUNT_EPSILON: f64 = 0.005;

/// Amount factor calibration
#[derive(Debug, Clone, Deserialize)]
pub struct AmountConfig {
    pub max_points: f64,
    /// Relative tolerance before an amount stops earning points
    pub tolerance_percent: f64,
    /// Fixed floor so small receipts still get a workable band
    pub tolerance_floor: f64,
}

impl AmountConfig {
    /// Absolute tolerance band around a receipt amount
    pub fn tolerance_for(&self, amount: f64) -> f64 {
        (amount.abs() * self.tolerance_percent).max(self.tolerance_floor)
    }
}

/// Date factor calibration
#[derive(Debug, Clone, Deserialize)]
pub struct DateConfig {
    pub max_points: f64,
    pub window_days: i64,
    /// Wider window for travel vendors, where the charge often settles late
    pub travel_window_days: i64,
}

impl DateConfig {
    pub fn widest_window(&self) -> i64 {
        self.window_days.max(self.travel_window_days)
    }
}

/// Vendor factor calibration
#[derive(Debug, Clone, Deserialize)]
pub struct VendorConfig {
    pub max_points: f64,
    /// Similarity cutoff below which the vendor contributes nothing
    pub min_similarity: f64,
    /// Tokens that mark a vendor as travel-prone
    pub travel_keywords: Vec<String>,
}

/// Proposal selection calibration
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionConfig {
    /// Minimum winning confidence before a proposal is written
    pub min_confidence: f64,
    /// Runner-up within this many points flags the run ambiguous
    pub ambiguity_delta: f64,
    /// Cap on candidates returned to the review UI
    pub max_candidates: usize,
}

/// Run-level limits
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Budget for a single receipt's candidate lookup and scoring
    pub receipt_timeout_ms: u64,
}

/// Full matching calibration
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    pub scale: f64,
    pub amount: AmountConfig,
    pub date: DateConfig,
    pub vendor: VendorConfig,
    pub selection: SelectionConfig,
    pub run: RunConfig,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            scale: 100.0,
            amount: AmountConfig {
                max_points: 50.0,
                tolerance_percent: 0.02,
                tolerance_floor: 5.0,
            },
            date: DateConfig {
                max_points: 30.0,
                window_days: 3,
                travel_window_days: 7,
            },
            vendor: VendorConfig {
                max_points: 20.0,
                min_similarity: 0.55,
                travel_keywords: [
                    "airline",
                    "airlines",
                    "airways",
                    "delta",
                    "united",
                    "southwest",
                    "hotel",
                    "inn",
                    "suites",
                    "marriott",
                    "hilton",
                    "hyatt",
                    "doubletree",
                    "hertz",
                    "enterprise",
                    "avis",
                    "rental",
                    "uber",
                    "lyft",
                    "parking",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            },
            selection: SelectionConfig {
                min_confidence: 55.0,
                ambiguity_delta: 5.0,
                max_candidates: 10,
            },
            run: RunConfig {
                receipt_timeout_ms: 5000,
            },
        }
    }
}

impl MatchingConfig {
    /// Parse and validate a TOML config string
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: MatchingConfig =
            toml::from_str(raw).map_err(|e| Error::Config(format!("parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load with override resolution: data-dir file first, embedded default
    /// otherwise.
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::override_path() {
            if path.exists() {
                let raw = fs::read_to_string(&path)?;
                tracing::info!(path = %path.display(), "Loading matching config override");
                return Self::from_toml(&raw);
            }
        }
        Self::from_toml(DEFAULT_CONFIG)
    }

    /// Location of the user override file, if a data dir exists
    pub fn override_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("chit").join("config").join("matching.toml"))
    }

    fn validate(&self) -> Result<()> {
        if self.scale <= 0.0 {
            return Err(Error::Config("scale must be positive".into()));
        }
        let sum = self.amount.max_points + self.date.max_points + self.vendor.max_points;
        if (sum - self.scale).abs() > 1e-6 {
            return Err(Error::Config(format!(
                "factor maxima must sum to scale: {} + {} + {} != {}",
                self.amount.max_points, self.date.max_points, self.vendor.max_points, self.scale
            )));
        }
        if !(0.0..=1.0).contains(&self.vendor.min_similarity) {
            return Err(Error::Config("vendor.min_similarity must be in [0, 1]".into()));
        }
        if self.amount.tolerance_percent < 0.0 || self.amount.tolerance_floor < 0.0 {
            return Err(Error::Config("amount tolerances must be non-negative".into()));
        }
        if self.date.window_days < 0 || self.date.travel_window_days < self.date.window_days {
            return Err(Error::Config(
                "date windows must be non-negative and travel window at least window_days".into(),
            ));
        }
        if self.selection.min_confidence > self.scale {
            return Err(Error::Config(
                "selection.min_confidence cannot exceed the scale".into(),
            ));
        }
        Ok(())
    }
}
