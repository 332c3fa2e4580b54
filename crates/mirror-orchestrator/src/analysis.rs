//! Skin analysis result mapping.
//!
//! The provider returns a loosely shaped `output` array of
//! `{type, ui_score?, raw_score?, score?}` entries whose location inside the
//! result varies. [`AnalysisResult::from_raw`] finds it, applies documented
//! defaults for absent facets, clamps every score to its range, and derives
//! recommendations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default facet score when the provider omits one.
pub const DEFAULT_FACET_SCORE: u8 = 75;
/// Default skin age when the provider omits it.
pub const DEFAULT_SKIN_AGE: u8 = 30;
/// Default overall score when the provider omits it.
pub const DEFAULT_OVERALL_SCORE: u8 = 85;
/// Upper bound for facet and overall scores.
pub const MAX_SCORE: u8 = 100;
/// Upper bound for skin age.
pub const MAX_SKIN_AGE: u8 = 120;

/// A skincare recommendation derived from score thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Texture below 70.
    HydratingSerum,
    /// Wrinkle score below 80.
    AntiAging,
    /// Pore score below 75.
    ClayMask,
    /// Blemish score below 90.
    AcneTreatment,
    /// Always included.
    SunProtection,
}

impl Recommendation {
    /// User-facing text.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::HydratingSerum => "Improve texture with a hydrating serum",
            Self::AntiAging => "Use anti-aging products with retinol or peptides",
            Self::ClayMask => "Try a clay mask weekly to minimize pores",
            Self::AcneTreatment => "Use targeted acne treatment products",
            Self::SunProtection => "Apply SPF 30+ daily for sun protection",
        }
    }
}

/// Normalized skin analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Texture score, 0-100.
    pub texture: u8,
    /// Pore score, 0-100.
    pub pore: u8,
    /// Wrinkle score, 0-100.
    pub wrinkle: u8,
    /// Blemish (acne) score, 0-100.
    pub blemish: u8,
    /// Estimated skin age, 0-120.
    pub skin_age: u8,
    /// Overall score, 0-100.
    pub overall: u8,
    /// Derived recommendations, sun protection last.
    pub recommendations: Vec<Recommendation>,
    /// When the result was produced.
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Maps a raw provider result.
    ///
    /// Returns `None` only when no output array can be found at all.
    #[must_use]
    pub fn from_raw(raw: &Value) -> Option<Self> {
        let output = locate_output(raw)?;

        let facet = |name: &str| {
            find_entry(output, name)
                .and_then(|e| number(e.get("ui_score")).or_else(|| number(e.get("raw_score"))))
        };
        let scored = |name: &str| find_entry(output, name).and_then(|e| number(e.get("score")));

        let texture = clamp_score(facet("texture"), DEFAULT_FACET_SCORE, MAX_SCORE);
        let pore = clamp_score(facet("pore"), DEFAULT_FACET_SCORE, MAX_SCORE);
        let wrinkle = clamp_score(facet("wrinkle"), DEFAULT_FACET_SCORE, MAX_SCORE);
        let blemish = clamp_score(facet("acne"), DEFAULT_FACET_SCORE, MAX_SCORE);
        let skin_age = clamp_score(scored("skin_age"), DEFAULT_SKIN_AGE, MAX_SKIN_AGE);
        let overall = clamp_score(scored("all"), DEFAULT_OVERALL_SCORE, MAX_SCORE);

        Some(Self {
            texture,
            pore,
            wrinkle,
            blemish,
            skin_age,
            overall,
            recommendations: recommendations_for(texture, wrinkle, pore, blemish),
            analyzed_at: Utc::now(),
        })
    }
}

/// Recommendations from fixed score thresholds.
#[must_use]
pub fn recommendations_for(texture: u8, wrinkle: u8, pore: u8, blemish: u8) -> Vec<Recommendation> {
    let mut out = Vec::with_capacity(5);
    if texture < 70 {
        out.push(Recommendation::HydratingSerum);
    }
    if wrinkle < 80 {
        out.push(Recommendation::AntiAging);
    }
    if pore < 75 {
        out.push(Recommendation::ClayMask);
    }
    if blemish < 90 {
        out.push(Recommendation::AcneTreatment);
    }
    out.push(Recommendation::SunProtection);
    out
}

fn locate_output(raw: &Value) -> Option<&Vec<Value>> {
    raw.as_array()
        .or_else(|| raw.get("output").and_then(Value::as_array))
        .or_else(|| raw.pointer("/results/output").and_then(Value::as_array))
        .or_else(|| raw.pointer("/result/output").and_then(Value::as_array))
}

fn find_entry<'a>(output: &'a [Value], kind: &str) -> Option<&'a Value> {
    output
        .iter()
        .find(|e| e.get("type").and_then(Value::as_str) == Some(kind))
}

/// A finite number, or a string holding one.
fn number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_score(value: Option<f64>, default: u8, max: u8) -> u8 {
    value.map_or(default, |v| v.round().clamp(0.0, f64::from(max)) as u8)
}
