//! Build-and-test validation of instrumented output.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tokio::process::Command;

static TEST_FAILURES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Tests run: \d+, Failures: (\d+), Errors: (\d+)").unwrap());

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("The instrumented source failed to compile")]
    CompileFailed { status: Option<i32>, output: String },

    #[error("The instrumented source failed to pass all tests")]
    TestsFailed { status: Option<i32>, output: String },

    #[error("Build timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Runs the build tool over an output directory.
#[derive(Debug, Clone)]
pub struct BuildRunner {
    program: String,
    phases: Vec<String>,
    timeout: Option<Duration>,
    verbose: bool,
}

impl BuildRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            phases: vec!["clean".to_string(), "test".to_string()],
            timeout: None,
            verbose: false,
        }
    }

    pub fn phases<I, S>(mut self, phases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.phases = phases.into_iter().map(Into::into).collect();
        self
    }

    /// Zero disables the timeout.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub async fn run(&self, dir: &Path) -> Result<BuildOutcome, BuildError> {
        tracing::info!("Running {} {} in {}", self.program, self.phases.join(" "), dir.display());
        let started = Instant::now();

        let mut command = Command::new(&self.program);
        command
            .args(&self.phases)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = command.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, output)
                .await
                .map_err(|_| BuildError::Timeout(limit))?,
            None => output.await,
        }
        .map_err(|source| BuildError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if self.verbose {
            for line in stdout.lines().chain(stderr.lines()) {
                tracing::info!("{}", line);
            }
        }

        if output.status.success() {
            return Ok(BuildOutcome {
                stdout,
                stderr,
                elapsed: started.elapsed(),
            });
        }

        let status = output.status.code();
        let combined = format!("{}{}", stdout, stderr);
        if reports_test_failures(&combined) {
            Err(BuildError::TestsFailed {
                status,
                output: combined,
            })
        } else {
            Err(BuildError::CompileFailed {
                status,
                output: combined,
            })
        }
    }
}

impl Default for BuildRunner {
    fn default() -> Self {
        Self::new("mvn")
    }
}

/// Whether build output shows that compilation succeeded but tests failed.
fn reports_test_failures(output: &str) -> bool {
    if output.contains("There are test failures") || output.contains("There were test failures") {
        return true;
    }
    TEST_FAILURES.captures_iter(output).any(|caps| &caps[1] != "0" || &caps[2] != "0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reports_test_failures() {
        assert!(reports_test_failures("Tests run: 4, Failures: 1, Errors: 0, Skipped: 0"));
        assert!(reports_test_failures("Tests run: 4, Failures: 0, Errors: 2, Skipped: 0"));
        assert!(reports_test_failures("[ERROR] There are test failures."));
        assert!(!reports_test_failures("Tests run: 4, Failures: 0, Errors: 0, Skipped: 1"));
        assert!(!reports_test_failures("[ERROR] COMPILATION ERROR"));
    }

    #[test]
    fn test_timeout_secs_zero_is_unbounded() {
        let runner = BuildRunner::default().timeout_secs(0);
        assert!(runner.timeout.is_none());
        assert_eq!(BuildRunner::default().timeout_secs(5).timeout, Some(Duration::from_secs(5)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_build() {
        let temp_dir = TempDir::new().unwrap();
        let outcome = BuildRunner::new("sh")
            .phases(["-c", "echo built"])
            .run(temp_dir.path())
            .await
            .unwrap();
        assert_eq!(outcome.stdout.trim(), "built");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_compile_failure() {
        let temp_dir = TempDir::new().unwrap();
        let err = BuildRunner::new("sh")
            .phases(["-c", "echo '[ERROR] COMPILATION ERROR'; exit 1"])
            .run(temp_dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::CompileFailed { status: Some(1), .. }));
        assert_eq!(err.to_string(), "The instrumented source failed to compile");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_test_failure() {
        let temp_dir = TempDir::new().unwrap();
        let err = BuildRunner::new("sh")
            .phases(["-c", "echo 'Tests run: 3, Failures: 1, Errors: 0'; exit 1"])
            .run(temp_dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::TestsFailed { .. }));
        assert_eq!(err.to_string(), "The instrumented source failed to pass all tests");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let temp_dir = TempDir::new().unwrap();
        let err = BuildRunner::new("sleep")
            .phases(["5"])
            .timeout(Duration::from_millis(100))
            .run(temp_dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let temp_dir = TempDir::new().unwrap();
        let err = BuildRunner::new("definitely-not-a-build-tool")
            .run(temp_dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
    }
}
