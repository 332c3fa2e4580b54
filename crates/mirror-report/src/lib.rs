//! Mirror skin report generation.
//!
//! Turns a normalized skin analysis into a [`SkinReport`] with per-facet
//! score bands, focus areas and recommendations. Reports serialize to JSON
//! for programmatic access or render to Markdown for people.
//!
//! This crate does not depend on the engine; callers fill a
//! [`ReportInput`] from whatever analysis type they hold.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use mirror_report::{ReportInput, ScoreBand, SkinReport};
//! use mirror_report::json::JsonGenerator;
//!
//! let report = SkinReport::new(ReportInput {
//!     image_name: "selfie.jpg".to_string(),
//!     texture: 62,
//!     pore: 78,
//!     wrinkle: 88,
//!     blemish: 91,
//!     skin_age: 29,
//!     overall: 80,
//!     recommendations: vec!["Apply SPF 30+ daily for sun protection".to_string()],
//!     analyzed_at: Utc::now(),
//! })
//! .unwrap();
//!
//! assert_eq!(report.overall_band, ScoreBand::Good);
//! let json = JsonGenerator::new(&report).generate_pretty().unwrap();
//! assert!(json.contains("focus_areas"));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Facets scored below this are reported as focus areas.
pub const FOCUS_THRESHOLD: u8 = 70;

/// Highest valid facet or overall score.
pub const MAX_SCORE: u8 = 100;

/// Highest valid skin age.
pub const MAX_SKIN_AGE: u8 = 120;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid report data.
    #[error("invalid report data: {0}")]
    InvalidData(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Score Bands
// ============================================================================

/// Qualitative band for a 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    /// Below 50.
    NeedsAttention,
    /// 50 to 69.
    Fair,
    /// 70 to 84.
    Good,
    /// 85 and above.
    Excellent,
}

impl ScoreBand {
    /// Band for a score.
    #[must_use]
    pub const fn from_score(score: u8) -> Self {
        match score {
            85.. => Self::Excellent,
            70..=84 => Self::Good,
            50..=69 => Self::Fair,
            _ => Self::NeedsAttention,
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::NeedsAttention => "Needs attention",
        }
    }
}

impl std::fmt::Display for ScoreBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Facets
// ============================================================================

/// A scored skin facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    /// Surface texture.
    Texture,
    /// Pore visibility.
    Pore,
    /// Fine lines and wrinkles.
    Wrinkle,
    /// Blemishes and acne.
    Blemish,
}

impl Facet {
    /// Every facet, in display order.
    pub const ALL: [Self; 4] = [Self::Texture, Self::Pore, Self::Wrinkle, Self::Blemish];

    /// Human-readable name.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Texture => "Texture",
            Self::Pore => "Pores",
            Self::Wrinkle => "Wrinkles",
            Self::Blemish => "Blemishes",
        }
    }
}

/// One facet's score and band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetScore {
    /// Which facet.
    pub facet: Facet,
    /// Score, 0-100.
    pub score: u8,
    /// Band for `score`.
    pub band: ScoreBand,
}

// ============================================================================
// Report
// ============================================================================

/// Analysis values a report is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportInput {
    /// Name of the analyzed image.
    pub image_name: String,
    /// Texture score, 0-100.
    pub texture: u8,
    /// Pore score, 0-100.
    pub pore: u8,
    /// Wrinkle score, 0-100.
    pub wrinkle: u8,
    /// Blemish score, 0-100.
    pub blemish: u8,
    /// Estimated skin age, 0-120.
    pub skin_age: u8,
    /// Overall score, 0-100.
    pub overall: u8,
    /// Recommendation texts, in order.
    pub recommendations: Vec<String>,
    /// When the analysis ran.
    pub analyzed_at: DateTime<Utc>,
}

/// Complete skin report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinReport {
    /// Name of the analyzed image.
    pub image_name: String,
    /// When the analysis ran.
    pub analyzed_at: DateTime<Utc>,
    /// Overall score, 0-100.
    pub overall: u8,
    /// Band for `overall`.
    pub overall_band: ScoreBand,
    /// Estimated skin age.
    pub skin_age: u8,
    /// Every facet in display order.
    pub facets: Vec<FacetScore>,
    /// Facets below [`FOCUS_THRESHOLD`], weakest first.
    pub focus_areas: Vec<Facet>,
    /// Recommendation texts.
    pub recommendations: Vec<String>,
}

impl SkinReport {
    /// Builds a report.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidData` when a score is out of range.
    pub fn new(input: ReportInput) -> Result<Self> {
        let scores = [input.texture, input.pore, input.wrinkle, input.blemish];
        for (facet, score) in Facet::ALL.iter().zip(scores) {
            if score > MAX_SCORE {
                return Err(ReportError::InvalidData(format!(
                    "{} score {score} exceeds {MAX_SCORE}",
                    facet.label()
                )));
            }
        }
        if input.overall > MAX_SCORE {
            return Err(ReportError::InvalidData(format!(
                "overall score {} exceeds {MAX_SCORE}",
                input.overall
            )));
        }
        if input.skin_age > MAX_SKIN_AGE {
            return Err(ReportError::InvalidData(format!(
                "skin age {} exceeds {MAX_SKIN_AGE}",
                input.skin_age
            )));
        }

        let facets: Vec<FacetScore> = Facet::ALL
            .into_iter()
            .zip(scores)
            .map(|(facet, score)| FacetScore {
                facet,
                score,
                band: ScoreBand::from_score(score),
            })
            .collect();

        let mut weak: Vec<&FacetScore> = facets
            .iter()
            .filter(|f| f.score < FOCUS_THRESHOLD)
            .collect();
        weak.sort_by_key(|f| f.score);
        let focus_areas = weak.into_iter().map(|f| f.facet).collect();

        Ok(Self {
            image_name: input.image_name,
            analyzed_at: input.analyzed_at,
            overall: input.overall,
            overall_band: ScoreBand::from_score(input.overall),
            skin_age: input.skin_age,
            facets,
            focus_areas,
            recommendations: input.recommendations,
        })
    }

    /// Serializes the report to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Serialization` if JSON serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(ReportError::from)
    }

    /// Score of one facet.
    #[must_use]
    pub fn score_of(&self, facet: Facet) -> Option<u8> {
        self.facets
            .iter()
            .find(|f| f.facet == facet)
            .map(|f| f.score)
    }

    /// Returns `true` when no facet needs focus.
    #[must_use]
    pub fn is_all_clear(&self) -> bool {
        self.focus_areas.is_empty()
    }
}
