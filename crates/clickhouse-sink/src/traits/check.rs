//! Connection check results

use std::fmt;
use std::time::Instant;

/// Outcome of `Sink::check`: an overall verdict plus one entry per step.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub success: bool,
    pub message: Option<String>,
    pub checks: Vec<CheckDetail>,
}

/// A single check step (e.g. "connectivity", "table_exists").
#[derive(Debug, Clone)]
pub struct CheckDetail {
    pub name: String,
    pub passed: bool,
    pub message: Option<String>,
    pub duration_ms: Option<u64>,
}

impl CheckDetail {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: None,
            duration_ms: None,
        }
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: Some(message.into()),
            duration_ms: None,
        }
    }

    /// Record the time elapsed since `started`.
    pub fn timed(mut self, started: Instant) -> Self {
        self.duration_ms = Some(started.elapsed().as_millis() as u64);
        self
    }
}

impl CheckResult {
    pub fn builder() -> CheckResultBuilder {
        CheckResultBuilder::default()
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckDetail> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// Look up a step by name.
    pub fn get(&self, name: &str) -> Option<&CheckDetail> {
        self.checks.iter().find(|c| c.name == name)
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            write!(f, "✓ Connection check passed")?;
        } else {
            write!(f, "✗ Connection check failed")?;
            if let Some(ref msg) = self.message {
                write!(f, ": {}", msg)?;
            }
        }

        for check in &self.checks {
            writeln!(f)?;
            let status = if check.passed { "✓" } else { "✗" };
            write!(f, "  {} {}", status, check.name)?;
            if let Some(ref msg) = check.message {
                write!(f, ": {}", msg)?;
            }
            if let Some(ms) = check.duration_ms {
                write!(f, " ({}ms)", ms)?;
            }
        }
        Ok(())
    }
}

/// Collects check steps; the result succeeds only if every step passed.
#[derive(Debug, Default)]
pub struct CheckResultBuilder {
    checks: Vec<CheckDetail>,
}

impl CheckResultBuilder {
    pub fn check(mut self, detail: CheckDetail) -> Self {
        self.checks.push(detail);
        self
    }

    pub fn build(self) -> CheckResult {
        let failed: Vec<String> = self
            .checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.message.clone().unwrap_or_else(|| c.name.clone()))
            .collect();

        CheckResult {
            success: failed.is_empty(),
            message: (!failed.is_empty()).then(|| failed.join("; ")),
            checks: self.checks,
        }
    }
}
