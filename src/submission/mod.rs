//! Local submission package: writeup, validated findings and instructions.

use crate::findings::{self, FileIssue};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const WRITEUP_FILE: &str = "writeup.md";
pub const FINDINGS_DIR: &str = "findings";
pub const README_FILE: &str = "README.md";

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("{} finding file(s) failed validation: {}", .0.len(), describe_issues(.0))]
    InvalidFindings(Vec<FileIssue>),

    #[error("Finding file name used twice: {0}")]
    DuplicateFileName(String),

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn describe_issues(issues: &[FileIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{} ({})", i.file, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Paths of an exported package.
#[derive(Debug, Clone)]
pub struct SubmissionPackage {
    pub root: PathBuf,
    pub writeup: PathBuf,
    pub readme: PathBuf,
    pub findings: Vec<PathBuf>,
}

/// Build the package directory under `output_dir`.
///
/// Every findings file is validated first; any hard validation error aborts
/// before anything is written.
pub fn export_package<P: AsRef<Path>>(
    findings_files: &[P],
    writeup: &str,
    output_dir: &Path,
    competition: &str,
) -> Result<SubmissionPackage, PackageError> {
    let report = findings::validate_files(findings_files);
    if report.invalid_findings > 0 {
        return Err(PackageError::InvalidFindings(report.errors));
    }
    if findings_files.is_empty() {
        tracing::warn!("Exporting submission package without any findings");
    }

    let mut names = Vec::with_capacity(findings_files.len());
    let mut seen = HashSet::new();
    for path in findings_files {
        let name = file_name(path.as_ref());
        if !seen.insert(name.clone()) {
            return Err(PackageError::DuplicateFileName(name));
        }
        names.push(name);
    }

    let findings_dir = output_dir.join(FINDINGS_DIR);
    fs::create_dir_all(&findings_dir).map_err(|source| PackageError::Io {
        path: findings_dir.clone(),
        source,
    })?;

    let mut copied = Vec::with_capacity(findings_files.len());
    for (src, name) in findings_files.iter().zip(&names) {
        let dst = findings_dir.join(name);
        fs::copy(src.as_ref(), &dst).map_err(|source| PackageError::Io {
            path: dst.clone(),
            source,
        })?;
        copied.push(dst);
    }

    let writeup_path = output_dir.join(WRITEUP_FILE);
    write_file(&writeup_path, writeup)?;

    let readme_path = output_dir.join(README_FILE);
    write_file(
        &readme_path,
        &render_instructions(&names, competition, Utc::now()),
    )?;

    tracing::info!(
        "Submission package created: {} ({} findings)",
        output_dir.display(),
        copied.len()
    );

    Ok(SubmissionPackage {
        root: output_dir.to_path_buf(),
        writeup: writeup_path,
        readme: readme_path,
        findings: copied,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn write_file(path: &Path, contents: &str) -> Result<(), PackageError> {
    fs::write(path, contents).map_err(|source| PackageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Generate the README placed at the package root.
pub fn render_instructions(
    finding_names: &[String],
    competition: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let mut readme = format!(
        "# Submission Package for {competition}

## Contents
- `{WRITEUP_FILE}`: Main submission writeup
- `{FINDINGS_DIR}/`: Directory containing individual findings JSON files
- `{README_FILE}`: This file with submission instructions

## Submission Instructions
1. Upload findings files as Kaggle datasets (keep private initially)
2. Create a new Kaggle writeup and attach the datasets
3. Copy content from {WRITEUP_FILE} into the Kaggle writeup
4. Submit the writeup to the competition

## Validation
- Total findings: {count}
- Generated: {generated}
- Competition: {competition}

## Files Included
",
        count = finding_names.len(),
        generated = generated_at.to_rfc3339(),
    );

    for name in finding_names {
        readme.push_str(&format!("- `{}/{}`\n", FINDINGS_DIR, name));
    }

    readme
}
