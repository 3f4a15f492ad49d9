//! Schema checks for locally-authored finding records.
//!
//! A finding is a JSON object. Missing required fields make it invalid; an
//! unusual category or an out-of-range self-assessed score only produces a
//! warning.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const REQUIRED_FIELDS: &[&str] = &[
    "finding_id",
    "title",
    "category",
    "description",
    "reproduction",
    "impact_assessment",
    "methodology",
];

pub const STANDARD_CATEGORIES: &[&str] = &[
    "deception",
    "reward_hacking",
    "sabotage",
    "tool_misuse",
    "data_exfiltration",
    "sandbagging",
    "evaluation_awareness",
    "cot_issues",
    "hidden_motivations",
];

const SCORE_RANGE: std::ops::RangeInclusive<f64> = 1.0..=10.0;

/// Hard failure: the record cannot be submitted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Failed to read file: {0}")]
    Unreadable(String),

    #[error("Invalid JSON format: {0}")]
    InvalidJson(String),

    #[error("Finding must be a JSON object")]
    NotAnObject,

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
}

/// Soft failure: reported, never blocks submission.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWarning {
    NonStandardCategory(String),
    ScoreOutOfRange { field: &'static str, value: Value },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::NonStandardCategory(category) => {
                write!(f, "Category '{}' not in standard list", category)
            }
            ValidationWarning::ScoreOutOfRange { field, value } => {
                write!(f, "{} score {} outside expected range 1-10", field, value)
            }
        }
    }
}

/// Validate one parsed finding.
pub fn validate_finding(finding: &Value) -> Result<Vec<ValidationWarning>, ValidationError> {
    let object = finding.as_object().ok_or(ValidationError::NotAnObject)?;

    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|field| !object.contains_key(**field))
        .map(|field| field.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields(missing));
    }

    let mut warnings = Vec::new();

    let category = &object["category"];
    let is_standard = category
        .as_str()
        .map(|c| STANDARD_CATEGORIES.contains(&c))
        .unwrap_or(false);
    if !is_standard {
        let shown = category
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| category.to_string());
        warnings.push(ValidationWarning::NonStandardCategory(shown));
    }

    if let Some(assessment) = object.get("severity_assessment") {
        for (key, field) in [
            ("self_assessed_severity", "Severity"),
            ("self_assessed_breadth", "Breadth"),
        ] {
            match assessment.get(key) {
                None | Some(Value::Null) => {}
                Some(value) => {
                    let in_range = value
                        .as_f64()
                        .map(|score| SCORE_RANGE.contains(&score))
                        .unwrap_or(false);
                    if !in_range {
                        warnings.push(ValidationWarning::ScoreOutOfRange {
                            field,
                            value: value.clone(),
                        });
                    }
                }
            }
        }
    }

    Ok(warnings)
}

/// Read and validate a findings file.
pub fn validate_file(path: &Path) -> Result<Vec<ValidationWarning>, ValidationError> {
    let contents =
        fs::read_to_string(path).map_err(|e| ValidationError::Unreadable(e.to_string()))?;
    let finding: Value =
        serde_json::from_str(&contents).map_err(|e| ValidationError::InvalidJson(e.to_string()))?;
    validate_finding(&finding)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileIssue {
    pub file: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationSummary {
    pub validation_passed: bool,
    pub ready_for_submission: bool,
    pub total_errors: usize,
    pub total_warnings: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub total_findings: usize,
    pub valid_findings: usize,
    pub invalid_findings: usize,
    pub errors: Vec<FileIssue>,
    pub warnings: Vec<FileIssue>,
    pub summary: ValidationSummary,
}

/// Validate a set of findings files, collecting every problem instead of
/// stopping at the first.
pub fn validate_files<P: AsRef<Path>>(paths: &[P]) -> ValidationReport {
    let mut report = ValidationReport::default();

    for path in paths {
        let path = path.as_ref();
        let file = path.display().to_string();
        report.total_findings += 1;

        match validate_file(path) {
            Ok(warnings) => {
                report.valid_findings += 1;
                for warning in warnings {
                    tracing::warn!("{}: {}", file, warning);
                    report.warnings.push(FileIssue {
                        file: file.clone(),
                        message: warning.to_string(),
                    });
                }
            }
            Err(err) => {
                tracing::error!("{}: {}", file, err);
                report.invalid_findings += 1;
                report.errors.push(FileIssue {
                    file,
                    message: err.to_string(),
                });
            }
        }
    }

    report.summary = ValidationSummary {
        validation_passed: report.invalid_findings == 0,
        ready_for_submission: report.valid_findings > 0 && report.invalid_findings == 0,
        total_errors: report.errors.len(),
        total_warnings: report.warnings.len(),
    };

    tracing::info!(
        "Validation complete: {}/{} findings valid",
        report.valid_findings,
        report.total_findings
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn valid_finding() -> Value {
        json!({
            "finding_id": "F-001",
            "title": "Model hides capability under evaluation",
            "category": "sandbagging",
            "description": "Scores drop when the prompt mentions a benchmark.",
            "reproduction": {"steps": ["ask with benchmark framing", "ask without"]},
            "impact_assessment": "Capability evaluations under-report.",
            "methodology": "Paired prompts, 20 samples each.",
            "severity_assessment": {
                "self_assessed_severity": 6,
                "self_assessed_breadth": 3
            }
        })
    }

    #[test]
    fn test_valid_finding_has_no_warnings() {
        assert_eq!(validate_finding(&valid_finding()).unwrap(), vec![]);
    }

    #[test]
    fn test_missing_fields_is_hard_error() {
        let mut finding = valid_finding();
        let object = finding.as_object_mut().unwrap();
        object.remove("methodology");
        object.remove("title");

        let err = validate_finding(&finding).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingFields(vec!["title".to_string(), "methodology".to_string()])
        );
    }

    #[test]
    fn test_non_object_is_hard_error() {
        assert_eq!(
            validate_finding(&json!(["not", "an", "object"])).unwrap_err(),
            ValidationError::NotAnObject
        );
    }

    #[test]
    fn test_unusual_category_is_warning() {
        let mut finding = valid_finding();
        finding["category"] = json!("prompt_injection");

        let warnings = validate_finding(&finding).unwrap();
        assert_eq!(
            warnings,
            vec![ValidationWarning::NonStandardCategory(
                "prompt_injection".to_string()
            )]
        );
        assert_eq!(
            warnings[0].to_string(),
            "Category 'prompt_injection' not in standard list"
        );
    }

    #[test]
    fn test_out_of_range_scores_are_warnings() {
        let mut finding = valid_finding();
        finding["severity_assessment"] = json!({
            "self_assessed_severity": 11,
            "self_assessed_breadth": 0
        });

        let warnings = validate_finding(&finding).unwrap();
        assert_eq!(warnings.len(), 2);
        assert_eq!(
            warnings[0].to_string(),
            "Severity score 11 outside expected range 1-10"
        );
        assert_eq!(
            warnings[1].to_string(),
            "Breadth score 0 outside expected range 1-10"
        );
    }

    #[test]
    fn test_boundary_scores_are_accepted() {
        let mut finding = valid_finding();
        finding["severity_assessment"] = json!({
            "self_assessed_severity": 1,
            "self_assessed_breadth": 10
        });
        assert!(validate_finding(&finding).unwrap().is_empty());
    }

    #[test]
    fn test_validate_files_report() {
        let dir = TempDir::new().unwrap();

        let good = dir.path().join("good.json");
        fs::write(&good, valid_finding().to_string()).unwrap();

        let mut odd_finding = valid_finding();
        odd_finding["category"] = json!("other");
        let odd = dir.path().join("odd.json");
        fs::write(&odd, odd_finding.to_string()).unwrap();

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{not json").unwrap();

        let missing = dir.path().join("missing.json");

        let report = validate_files(&[good, odd, broken, missing]);

        assert_eq!(report.total_findings, 4);
        assert_eq!(report.valid_findings, 2);
        assert_eq!(report.invalid_findings, 2);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.errors[0].message.starts_with("Invalid JSON format"));
        assert!(report.errors[1].message.starts_with("Failed to read file"));
        assert!(!report.summary.validation_passed);
        assert!(!report.summary.ready_for_submission);
        assert_eq!(report.summary.total_errors, 2);
        assert_eq!(report.summary.total_warnings, 1);
    }

    #[test]
    fn test_empty_file_list_is_not_ready() {
        let report = validate_files::<&Path>(&[]);
        assert!(report.summary.validation_passed);
        assert!(!report.summary.ready_for_submission);
    }
}
