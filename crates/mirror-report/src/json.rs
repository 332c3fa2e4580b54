//! JSON report generation.
//!
//! [`JsonGenerator`] writes a [`SkinReport`] as compact or pretty JSON.
//!
//! # Example
//!
//! ```rust,no_run
//! use mirror_report::{json::JsonGenerator, SkinReport};
//! use std::path::Path;
//!
//! # fn example(report: &SkinReport) -> mirror_report::Result<()> {
//! JsonGenerator::new(report).write_to_file(Path::new("skin-report.json"), true)?;
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{ReportError, Result, SkinReport};

/// JSON report generator.
pub struct JsonGenerator<'a> {
    report: &'a SkinReport,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a new JSON generator for the given report.
    #[must_use]
    pub const fn new(report: &'a SkinReport) -> Self {
        Self { report }
    }

    /// Generates compact JSON output (single line).
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.report).map_err(ReportError::from)
    }

    /// Generates pretty-printed JSON output.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.report).map_err(ReportError::from)
    }

    /// Writes the report to a file, creating or overwriting it.
    ///
    /// Parent directories must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    /// Returns [`ReportError::Io`] if file creation or writing fails.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::fixtures::sample_report;

    #[test]
    fn test_generate_compact_json() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate().unwrap();

        assert!(!json.contains('\n'));
        assert!(json.contains(r#""image_name":"selfie_front.jpg""#));
        assert!(json.contains(r#""overall":74"#));
        assert!(json.contains(r#""focus_areas":["pore","texture"]"#));
    }

    #[test]
    fn test_generate_pretty_json() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate_pretty().unwrap();

        assert!(json.contains('\n'));
        assert!(json.contains("  "));
        assert!(json.contains("\"skin_age\": 31"));
    }

    #[test]
    fn test_json_round_trips() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate().unwrap();
        let parsed: SkinReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_write_to_file() {
        let report = sample_report();
        let path = std::env::temp_dir().join(format!(
            "mirror-report-test-{}.json",
            std::process::id()
        ));

        JsonGenerator::new(&report)
            .write_to_file(&path, false)
            .unwrap();

        let mut contents = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(contents.contains("selfie_front.jpg"));
        assert!(!contents.contains('\n'));
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let report = sample_report();
        let path = Path::new("/nonexistent-mirror-dir/report.json");
        let err = JsonGenerator::new(&report)
            .write_to_file(path, true)
            .unwrap_err();
        assert!(matches!(err, ReportError::Io(_)));
    }
}
