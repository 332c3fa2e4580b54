//! Effect payload builder.
//!
//! Pure mapping from a semantic [`EffectRequest`] to the provider's effect
//! payload. Each known [`MakeupCategory`] has one static [`CategoryProfile`]
//! naming its pattern tiers and derived-parameter coefficients; nothing here
//! touches the network or shared state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Intensity at or above which the middle pattern tier is selected.
pub const MIDDLE_TIER_THRESHOLD: f64 = 0.40;

/// Intensity at or above which the strongest pattern tier is selected.
pub const STRONG_TIER_THRESHOLD: f64 = 0.70;

// ============================================================================
// Request types
// ============================================================================

/// A makeup category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MakeupCategory {
    /// Lip color.
    Lipstick,
    /// Eye shadow.
    Eyeshadow,
    /// Cheek blush.
    Blush,
    /// Foundation.
    Foundation,
    /// Eye liner.
    Eyeliner,
    /// Highlighter.
    Highlighter,
    /// Skin smoothing.
    SkinSmoothing,
    /// Any category without a profile; sent with a minimal payload.
    Unknown(String),
}

impl MakeupCategory {
    /// Parses a category name, tolerating case, dashes, and spaces.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        let normalized = name.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "lipstick" | "lip" | "lips" | "lip_color" => Self::Lipstick,
            "eyeshadow" | "eye_shadow" => Self::Eyeshadow,
            "blush" => Self::Blush,
            "foundation" => Self::Foundation,
            "eyeliner" | "eye_liner" => Self::Eyeliner,
            "highlighter" => Self::Highlighter,
            "skin_smoothing" | "skinsmoothing" | "skin_smooth" | "smoothing" => {
                Self::SkinSmoothing
            }
            _ => Self::Unknown(normalized),
        }
    }

    /// Caller-facing name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Lipstick => "lipstick",
            Self::Eyeshadow => "eyeshadow",
            Self::Blush => "blush",
            Self::Foundation => "foundation",
            Self::Eyeliner => "eyeliner",
            Self::Highlighter => "highlighter",
            Self::SkinSmoothing => "skin_smoothing",
            Self::Unknown(name) => name,
        }
    }

    /// Profile for known categories.
    #[must_use]
    pub const fn profile(&self) -> Option<&'static CategoryProfile> {
        match self {
            Self::Lipstick => Some(&LIPSTICK),
            Self::Eyeshadow => Some(&EYESHADOW),
            Self::Blush => Some(&BLUSH),
            Self::Foundation => Some(&FOUNDATION),
            Self::Eyeliner => Some(&EYELINER),
            Self::Highlighter => Some(&HIGHLIGHTER),
            Self::SkinSmoothing => Some(&SKIN_SMOOTHING),
            Self::Unknown(_) => None,
        }
    }

    /// Provider category tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        self.profile().map_or_else(|| self.name(), |p| p.tag)
    }
}

impl fmt::Display for MakeupCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for MakeupCategory {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for MakeupCategory {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// Finish hint chosen by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finish {
    /// Maps to `matte`.
    #[default]
    Natural,
    /// Maps to `gloss`.
    Bold,
    /// Maps to `satin`.
    Soft,
}

impl Finish {
    /// Provider texture label.
    #[must_use]
    pub const fn texture(self) -> &'static str {
        match self {
            Self::Natural => "matte",
            Self::Bold => "gloss",
            Self::Soft => "satin",
        }
    }

    /// Parses a finish name case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "natural" => Some(Self::Natural),
            "bold" => Some(Self::Bold),
            "soft" => Some(Self::Soft),
            _ => None,
        }
    }
}

/// One "apply effect" request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectRequest {
    /// Makeup category.
    pub category: MakeupCategory,
    /// Color value, usually `#rrggbb`.
    pub color: String,
    /// Strength in `[0, 1]`. Out-of-range values are clamped by the builder.
    pub intensity: f64,
    /// Finish hint.
    #[serde(default)]
    pub finish: Finish,
}

impl EffectRequest {
    /// Creates a request with the default finish.
    #[must_use]
    pub fn new(category: MakeupCategory, color: impl Into<String>, intensity: f64) -> Self {
        Self {
            category,
            color: color.into(),
            intensity,
            finish: Finish::default(),
        }
    }

    /// Sets the finish.
    #[must_use]
    pub const fn with_finish(mut self, finish: Finish) -> Self {
        self.finish = finish;
        self
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// Static description of how one category is rendered.
#[derive(Debug)]
pub struct CategoryProfile {
    /// Provider category tag.
    pub tag: &'static str,
    /// Pattern names for tiers 0, 1, 2. `None` for unpatterned effects.
    pub patterns: Option<[&'static str; 3]>,
    /// Whether the finish texture is sent.
    pub textured: bool,
    /// Derived parameters as fractions of the rescaled intensity.
    pub coefficients: &'static [(&'static str, f64)],
}

static LIPSTICK: CategoryProfile = CategoryProfile {
    tag: "lip_color",
    patterns: Some(["sheer", "classic", "full"]),
    textured: true,
    coefficients: &[("gloss", 0.93)],
};

static EYESHADOW: CategoryProfile = CategoryProfile {
    tag: "eye_shadow",
    patterns: Some(["1color1", "2colors1", "3colors1"]),
    textured: true,
    coefficients: &[("shimmerIntensity", 0.60), ("transparencyIntensity", 0.35)],
};

static BLUSH: CategoryProfile = CategoryProfile {
    tag: "blush",
    patterns: Some(["subtle", "natural", "defined"]),
    textured: true,
    coefficients: &[("coverage", 0.80)],
};

static FOUNDATION: CategoryProfile = CategoryProfile {
    tag: "foundation",
    patterns: Some(["sheer", "medium", "full"]),
    textured: true,
    coefficients: &[("coverageLevel", 0.85), ("glowIntensity", 0.30)],
};

static EYELINER: CategoryProfile = CategoryProfile {
    tag: "eye_liner",
    patterns: Some(["thin", "classic", "winged"]),
    textured: false,
    coefficients: &[("thickness", 0.50)],
};

static HIGHLIGHTER: CategoryProfile = CategoryProfile {
    tag: "highlighter",
    patterns: Some(["subtle", "glow", "radiant"]),
    textured: false,
    coefficients: &[("shimmerIntensity", 0.75)],
};

static SKIN_SMOOTHING: CategoryProfile = CategoryProfile {
    tag: "skin_smooth",
    patterns: None,
    textured: false,
    coefficients: &[("skinSmoothStrength", 0.55), ("skinSmoothColorIntensity", 0.45)],
};

// ============================================================================
// Builder
// ============================================================================

/// Provider effect payload. Pure value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectPayload {
    /// Provider category tag.
    pub category: String,
    /// Selected pattern name, if the category is patterned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Color value.
    pub color: String,
    /// Texture label, if the category takes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
    /// Intensity on the provider's 0-100 scale.
    pub intensity: u8,
    /// Derived parameters on the 0-100 scale.
    pub derived: BTreeMap<String, u8>,
}

/// Clamps to `[0, 1]`; `NaN` becomes 0.
#[must_use]
pub fn normalize_intensity(intensity: f64) -> f64 {
    if intensity.is_nan() {
        0.0
    } else {
        intensity.clamp(0.0, 1.0)
    }
}

/// Rescales a `[0, 1]` intensity to the provider's 0-100 integer domain.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rescale_intensity(intensity: f64) -> u8 {
    (normalize_intensity(intensity) * 100.0).round() as u8
}

/// Pattern tier (0, 1 or 2) for an intensity.
///
/// # Examples
///
/// ```
/// use mirror_orchestrator::effects::pattern_tier;
///
/// assert_eq!(pattern_tier(0.39), 0);
/// assert_eq!(pattern_tier(0.40), 1);
/// assert_eq!(pattern_tier(0.69), 1);
/// assert_eq!(pattern_tier(0.70), 2);
/// ```
#[must_use]
pub fn pattern_tier(intensity: f64) -> usize {
    let intensity = normalize_intensity(intensity);
    if intensity < MIDDLE_TIER_THRESHOLD {
        0
    } else if intensity < STRONG_TIER_THRESHOLD {
        1
    } else {
        2
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn derive(scaled: u8, coefficient: f64) -> u8 {
    (f64::from(scaled) * coefficient).round().clamp(0.0, 100.0) as u8
}

/// Builds the provider payload for one effect.
#[must_use]
pub fn build_effect_payload(request: &EffectRequest) -> EffectPayload {
    let intensity = rescale_intensity(request.intensity);

    let Some(profile) = request.category.profile() else {
        return EffectPayload {
            category: request.category.tag().to_string(),
            pattern: None,
            color: request.color.clone(),
            texture: None,
            intensity,
            derived: BTreeMap::new(),
        };
    };

    let tier = pattern_tier(request.intensity);
    EffectPayload {
        category: profile.tag.to_string(),
        pattern: profile.patterns.map(|p| p[tier].to_string()),
        color: request.color.clone(),
        texture: profile
            .textured
            .then(|| request.finish.texture().to_string()),
        intensity,
        derived: profile
            .coefficients
            .iter()
            .map(|(name, coefficient)| ((*name).to_string(), derive(intensity, *coefficient)))
            .collect(),
    }
}

impl EffectPayload {
    /// Provider wire shape: `{category, pattern?: {name}, palettes: [{color, texture?, colorIntensity, ...derived}]}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut palette = Map::new();
        palette.insert("color".into(), json!(self.color));
        if let Some(texture) = &self.texture {
            palette.insert("texture".into(), json!(texture));
        }
        palette.insert("colorIntensity".into(), json!(self.intensity));
        for (name, value) in &self.derived {
            palette.insert(name.clone(), json!(value));
        }

        let mut effect = Map::new();
        effect.insert("category".into(), json!(self.category));
        if let Some(pattern) = &self.pattern {
            effect.insert("pattern".into(), json!({ "name": pattern }));
        }
        effect.insert("palettes".into(), Value::Array(vec![Value::Object(palette)]));
        Value::Object(effect)
    }
}

/// Task-creation parameters for a set of effects applied as one task.
#[must_use]
pub fn effects_parameters(requests: &[EffectRequest], version: &str) -> Map<String, Value> {
    let effects = requests
        .iter()
        .map(|r| build_effect_payload(r).to_json())
        .collect();
    let mut params = Map::new();
    params.insert("effects".into(), Value::Array(effects));
    params.insert("version".into(), json!(version));
    params
}
