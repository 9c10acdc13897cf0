//! Configuration diagnostics.
//!
//! Verifies that the upstream settings each route needs are present and that
//! uploads can be staged.

use crate::config::Config;
use std::path::Path;

/// Result of a single check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Setting is present and usable
    Ok(String),
    /// Required setting is missing
    Missing,
    /// Present but with issues
    Warning(String),
}

impl CheckResult {
    fn from_setting(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => CheckResult::Ok(v.to_string()),
            _ => CheckResult::Missing,
        }
    }
}

/// One labelled check.
#[derive(Debug)]
pub struct Check {
    pub label: &'static str,
    pub result: CheckResult,
    /// A missing required setting makes the report fail.
    pub required: bool,
}

/// Check the upstream settings and upload directory of `config`.
pub fn run_checks(config: &Config) -> Vec<Check> {
    let upstream = &config.upstream;
    let api_key = CheckResult::from_setting(upstream.api_key.as_deref());
    let api_key = match api_key {
        CheckResult::Ok(_) => CheckResult::Ok("set".to_string()),
        other => other,
    };

    vec![
        Check {
            label: "Endpoint (AZURE_OPENAI_ENDPOINT)",
            result: CheckResult::from_setting(upstream.endpoint.as_deref()),
            required: true,
        },
        Check {
            label: "API key (AZURE_OPENAI_API_KEY)",
            result: api_key,
            required: true,
        },
        Check {
            label: "Chat deployment (AZURE_OPENAI_DEPLOYMENT_NAME)",
            result: CheckResult::from_setting(upstream.chat_deployment.as_deref()),
            required: true,
        },
        Check {
            label: "Transcription deployment (AZURE_OPENAI_WHISPER_DEPLOYMENT)",
            result: CheckResult::from_setting(upstream.transcription_deployment.as_deref()),
            required: false,
        },
        Check {
            label: "Upload directory",
            result: check_upload_dir(&config.transcription.upload_dir()),
            required: true,
        },
    ]
}

/// Whether a staged file can be created in `dir`.
fn check_upload_dir(dir: &Path) -> CheckResult {
    match tempfile::Builder::new().prefix(".tokenrelay-check-").tempfile_in(dir) {
        Ok(file) => match file.close() {
            Ok(()) => CheckResult::Ok(dir.display().to_string()),
            Err(e) => CheckResult::Warning(format!("{}: cleanup failed: {e}", dir.display())),
        },
        Err(e) => CheckResult::Warning(format!("{} is not writable: {e}", dir.display())),
    }
}

/// Whether every required check passed.
pub fn all_required_ok(checks: &[Check]) -> bool {
    checks
        .iter()
        .filter(|check| check.required)
        .all(|check| matches!(check.result, CheckResult::Ok(_)))
}

/// Print the report. Returns `true` if every required check passed.
pub fn print_report(checks: &[Check]) -> bool {
    println!("Checking relay configuration...\n");
    for check in checks {
        match &check.result {
            CheckResult::Ok(detail) => println!("{}: ✓ {}", check.label, detail),
            CheckResult::Missing if check.required => println!("{}: ✗ NOT SET", check.label),
            CheckResult::Missing => println!("{}: - not set (route disabled)", check.label),
            CheckResult::Warning(msg) => println!("{}: ⚠ WARNING: {}", check.label, msg),
        }
    }
    println!();
    all_required_ok(checks)
}
