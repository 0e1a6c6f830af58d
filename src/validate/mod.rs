use std::num::IntErrorKind;
use std::path::{Path, PathBuf};

/// Extension every output file must carry
pub const OUTPUT_EXTENSION: &str = ".mp3";

/// Item counts must be strictly greater than this
pub const MIN_ITEM_COUNT: u32 = 10;

/// Clip durations (seconds) must be strictly greater than this
pub const MIN_CLIP_SECONDS: u32 = 20;

/// Unvalidated arguments as they arrive from the front end
#[derive(Debug, Clone, Default)]
pub struct RawArgs {
    pub source_query: String,
    pub item_count: String,
    pub clip_duration: String,
    pub output_path: String,
}

/// A request that passed validation. Fields are read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRequest {
    source_query: String,
    item_count: u32,
    clip_duration_secs: u32,
    output_path: PathBuf,
}

impl PipelineRequest {
    pub fn source_query(&self) -> &str {
        &self.source_query
    }

    pub fn item_count(&self) -> u32 {
        self.item_count
    }

    pub fn clip_duration_secs(&self) -> u32 {
        self.clip_duration_secs
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

/// Every rule a request broke, in checking order
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid request: {}", .violations.join("; "))]
pub struct ValidationError {
    pub violations: Vec<String>,
}

impl RawArgs {
    pub fn new(
        source_query: impl Into<String>,
        item_count: impl Into<String>,
        clip_duration: impl Into<String>,
        output_path: impl Into<String>,
    ) -> Self {
        Self {
            source_query: source_query.into(),
            item_count: item_count.into(),
            clip_duration: clip_duration.into(),
            output_path: output_path.into(),
        }
    }

    /// Check every rule without touching the network or filesystem.
    ///
    /// All violations are collected so the caller sees every problem at once.
    pub fn validate(&self) -> Result<PipelineRequest, ValidationError> {
        let mut violations = Vec::new();

        let item_count = parse_above("<ItemCount>", &self.item_count, MIN_ITEM_COUNT)
            .map_err(|violation| violations.push(violation))
            .ok();

        let clip_duration = parse_above("<ClipDuration>", &self.clip_duration, MIN_CLIP_SECONDS)
            .map_err(|violation| violations.push(violation))
            .ok();

        if !self.output_path.ends_with(OUTPUT_EXTENSION) {
            violations.push(format!(
                "<OutputFile> must end with '{}'. Got: '{}'",
                OUTPUT_EXTENSION, self.output_path
            ));
        }

        let query = self.source_query.trim();
        if query.is_empty() {
            violations.push("<SourceQuery> must not be empty".to_string());
        }

        match (item_count, clip_duration) {
            (Some(item_count), Some(clip_duration_secs)) if violations.is_empty() => {
                Ok(PipelineRequest {
                    source_query: query.to_string(),
                    item_count,
                    clip_duration_secs,
                    output_path: PathBuf::from(&self.output_path),
                })
            }
            _ => Err(ValidationError { violations }),
        }
    }
}

/// Parse an integer strictly above `floor` that still fits the request's `u32` fields
fn parse_above(label: &str, raw: &str, floor: u32) -> Result<u32, String> {
    let too_small = || format!("{} must be an integer greater than {}. Got: '{}'", label, floor, raw);

    match raw.trim().parse::<u32>() {
        Ok(value) if value > floor => Ok(value),
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => Err(format!(
            "{} is too large, the maximum is {}. Got: '{}'",
            label,
            u32::MAX,
            raw
        )),
        _ => Err(too_small()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_valid_request() {
        let request = RawArgs::new("  Sharry Maan ", "12", "25", "out.mp3")
            .validate()
            .unwrap();

        assert_eq!(request.source_query(), "Sharry Maan");
        assert_eq!(request.item_count(), 12);
        assert_eq!(request.clip_duration_secs(), 25);
        assert_eq!(request.output_path(), Path::new("out.mp3"));
    }

    #[test]
    fn test_boundaries_are_exclusive() {
        assert!(RawArgs::new("x", "10", "25", "a.mp3").validate().is_err());
        assert!(RawArgs::new("x", "11", "25", "a.mp3").validate().is_ok());
        assert!(RawArgs::new("x", "11", "20", "a.mp3").validate().is_err());
        assert!(RawArgs::new("x", "11", "21", "a.mp3").validate().is_ok());
    }

    #[test]
    fn test_rejects_non_integers() {
        let err = RawArgs::new("x", "twelve", "25.5", "a.mp3")
            .validate()
            .unwrap_err();

        assert_eq!(err.violations.len(), 2);
        assert!(err.violations[0].contains("'twelve'"));
        assert!(err.violations[1].contains("'25.5'"));
    }

    #[test]
    fn test_rejects_negative_count() {
        let err = RawArgs::new("x", "-15", "25", "a.mp3").validate().unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert!(err.violations[0].contains("<ItemCount>"));
    }

    #[test]
    fn test_rejects_oversized_integers_as_too_large() {
        let err = RawArgs::new("x", "99999999999", "25", "a.mp3").validate().unwrap_err();

        assert_eq!(err.violations.len(), 1);
        assert!(err.violations[0].starts_with("<ItemCount> is too large"));
        assert!(err.violations[0].contains("'99999999999'"));
        assert!(RawArgs::new("x", "4294967295", "25", "a.mp3").validate().is_ok());
    }

    #[test]
    fn test_rejects_wrong_extension() {
        let err = RawArgs::new("x", "12", "25", "out.wav").validate().unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert!(err.violations[0].contains("'.mp3'"));
    }

    #[test]
    fn test_reports_every_violation_together() {
        let err = RawArgs::new("   ", "3", "5", "out.ogg").validate().unwrap_err();

        assert_eq!(err.violations.len(), 4);
        let message = err.to_string();
        assert!(message.contains("<ItemCount>"));
        assert!(message.contains("<ClipDuration>"));
        assert!(message.contains("<OutputFile>"));
        assert!(message.contains("<SourceQuery>"));
    }
}
