use crate::utils::error::Result;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One entry in a sponge log test suite.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub duration: Duration,
    pub failure: Option<String>,
}

impl TestCase {
    pub fn passed(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
            failure: None,
        }
    }

    pub fn failed(name: impl Into<String>, duration: Duration, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duration,
            failure: Some(message.into()),
        }
    }
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Writes a JUnit-style `sponge_log.xml` for the given suite, creating parent
/// directories as needed. CI reporting systems collect these by glob, so the
/// file name is fixed.
pub fn write_sponge_log(dir: &Path, suite_name: &str, cases: &[TestCase]) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let failures = cases.iter().filter(|c| c.failure.is_some()).count();
    let total_secs: f64 = cases.iter().map(|c| c.duration.as_secs_f64()).sum();
    let timestamp = chrono::Utc::now().to_rfc3339();

    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" time=\"{:.3}\" timestamp=\"{}\">\n",
        xml_escape(suite_name),
        cases.len(),
        failures,
        total_secs,
        xml_escape(&timestamp),
    ));
    for case in cases {
        match &case.failure {
            None => {
                xml.push_str(&format!(
                    "  <testcase name=\"{}\" time=\"{:.3}\"/>\n",
                    xml_escape(&case.name),
                    case.duration.as_secs_f64(),
                ));
            }
            Some(message) => {
                xml.push_str(&format!(
                    "  <testcase name=\"{}\" time=\"{:.3}\">\n    <failure message=\"{}\"/>\n  </testcase>\n",
                    xml_escape(&case.name),
                    case.duration.as_secs_f64(),
                    xml_escape(message),
                ));
            }
        }
    }
    xml.push_str("</testsuite>\n");

    let path = dir.join("sponge_log.xml");
    fs::write(&path, xml)?;
    Ok(path)
}

/// Finds every collected test artifact under `root`, i.e. files matching
/// `**/unit_tests/sponge_log.xml` or `**/integration_tests/sponge_log.xml`.
/// An empty result is a normal outcome, not an error.
pub fn find_sponge_logs(root: &Path) -> Vec<PathBuf> {
    let pattern =
        Regex::new(r"(^|/)(unit_tests|integration_tests)/sponge_log\.xml$").expect("static regex");

    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                let normalized = relative.to_string_lossy().replace('\\', "/");
                if pattern.is_match(&normalized) {
                    found.push(path);
                }
            }
        }
    }
    found.sort();
    found
}
