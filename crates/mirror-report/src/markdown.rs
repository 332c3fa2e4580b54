//! Markdown report generation.
//!
//! [`MarkdownGenerator`] renders a [`SkinReport`] as a summary table, a
//! facet table with score bands, focus areas and numbered recommendations.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use mirror_report::{MarkdownGenerator, ReportInput, SkinReport};
//!
//! let report = SkinReport::new(ReportInput {
//!     image_name: "selfie.jpg".to_string(),
//!     texture: 90,
//!     pore: 90,
//!     wrinkle: 90,
//!     blemish: 90,
//!     skin_age: 25,
//!     overall: 90,
//!     recommendations: vec![],
//!     analyzed_at: Utc::now(),
//! })
//! .unwrap();
//!
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# Skin Analysis Report"));
//! ```

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::{FacetScore, ScoreBand, SkinReport};

/// Generates Markdown reports.
pub struct MarkdownGenerator<'a> {
    report: &'a SkinReport,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a SkinReport) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_facets(&mut output);
        self.write_focus_areas(&mut output);
        self.write_recommendations(&mut output);
        Self::write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Skin Analysis Report: {}\n",
            escape_markdown(&self.report.image_name)
        );
    }

    fn write_summary(&self, output: &mut String) {
        let report = self.report;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(
            output,
            "| Overall | {} {}/100 ({}) |",
            band_icon(report.overall_band),
            report.overall,
            report.overall_band
        );
        let _ = writeln!(output, "| Skin age | {} |", report.skin_age);
        let _ = writeln!(
            output,
            "| Analyzed | {} |",
            format_timestamp(&report.analyzed_at)
        );
        let _ = writeln!(output);
    }

    fn write_facets(&self, output: &mut String) {
        let _ = writeln!(output, "## Scores\n");
        let _ = writeln!(output, "| Facet | Score | Band |");
        let _ = writeln!(output, "|-------|-------|------|");
        for facet in &self.report.facets {
            Self::write_facet_row(output, facet);
        }
        let _ = writeln!(output);
    }

    fn write_facet_row(output: &mut String, facet: &FacetScore) {
        let _ = writeln!(
            output,
            "| {} | {} | {} {} |",
            facet.facet.label(),
            facet.score,
            band_icon(facet.band),
            facet.band
        );
    }

    fn write_focus_areas(&self, output: &mut String) {
        let _ = writeln!(output, "## Focus Areas\n");

        if self.report.focus_areas.is_empty() {
            let _ = writeln!(output, "*All facets are in good shape.*\n");
            return;
        }

        for facet in &self.report.focus_areas {
            let score = self.report.score_of(*facet).unwrap_or_default();
            let _ = writeln!(output, "- **{}** ({score}/100)", facet.label());
        }
        let _ = writeln!(output);
    }

    fn write_recommendations(&self, output: &mut String) {
        let _ = writeln!(output, "## Recommendations\n");

        if self.report.recommendations.is_empty() {
            let _ = writeln!(output, "*No specific recommendations.*\n");
            return;
        }

        for (index, rec) in self.report.recommendations.iter().enumerate() {
            let _ = writeln!(output, "{}. {}", index + 1, escape_markdown(rec));
        }
        let _ = writeln!(output);
    }

    fn write_footer(output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = format_timestamp(&Utc::now());
        let _ = writeln!(output, "*Generated by Mirror at {timestamp}*");
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// HTML entity for a band, for cross-platform rendering.
const fn band_icon(band: ScoreBand) -> &'static str {
    match band {
        ScoreBand::Excellent => "&#128994;",
        ScoreBand::Good => "&#128309;",
        ScoreBand::Fair => "&#128993;",
        ScoreBand::NeedsAttention => "&#128308;",
    }
}

/// Escapes Markdown control characters.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
