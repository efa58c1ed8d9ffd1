//! Model counter backends
//!
//! A worker never counts by itself; it hands the cube-restricted formula to
//! a [`ModelCounter`]. [`ExternalCounter`] runs a counter binary (ganak's
//! output conventions) under a wall-clock budget.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tempfile::TempDir;
use tokio::process::Command;

use super::WorkerError;

static EXACT_COUNT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"c\s+o\s+exact\s+arb\s+(\d+)").unwrap());
static EXACT_INT_COUNT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"c\s+s\s+exact\s+arb\s+int\s+(\d+)").unwrap());
static UNSAT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^s\s+UNSATISFIABLE\b").unwrap());

/// Result of one counting attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountOutcome {
    /// Decimal count as printed by the counter
    Count(String),

    /// The budget ran out first
    TimedOut,

    /// The counter finished but printed no recognizable count
    Unrecognized(String),
}

/// Something that can count the models of a DIMACS formula
#[async_trait]
pub trait ModelCounter: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Count the models of `dimacs`, giving up after `budget`
    async fn count(&self, dimacs: &str, budget: Duration) -> Result<CountOutcome, WorkerError>;
}

/// Extract the exact count from counter output.
///
/// Recognizes `c o exact arb N` and `c s exact arb int N`; an
/// `s UNSATISFIABLE` line means zero models.
pub fn parse_counter_output(stdout: &str) -> Option<String> {
    if let Some(caps) = EXACT_COUNT_REGEX.captures(stdout) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = EXACT_INT_COUNT_REGEX.captures(stdout) {
        return Some(caps[1].to_string());
    }
    if UNSAT_REGEX.is_match(stdout) {
        return Some("0".to_string());
    }
    None
}

// ============================================================================
// External process
// ============================================================================

/// Counter binary invoked as `<program> [args...] <input.cnf>`
#[derive(Debug, Clone)]
pub struct ExternalCounter {
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalCounter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Extra arguments placed before the input path
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl ModelCounter for ExternalCounter {
    fn name(&self) -> &str {
        self.program.to_str().unwrap_or("counter")
    }

    async fn count(&self, dimacs: &str, budget: Duration) -> Result<CountOutcome, WorkerError> {
        let temp_dir = TempDir::new().map_err(|e| WorkerError::Io(e.to_string()))?;
        let input = temp_dir.path().join("cube.cnf");
        tokio::fs::write(&input, dimacs)
            .await
            .map_err(|e| WorkerError::Io(format!("{}: {}", input.display(), e)))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| WorkerError::CounterSpawn {
            program: self.program.clone(),
            reason: e.to_string(),
        })?;

        // Dropping the pending future kills the child
        let output = match tokio::time::timeout(budget, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| WorkerError::Io(e.to_string()))?,
            Err(_) => return Ok(CountOutcome::TimedOut),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        tracing::trace!(status = ?output.status, stdout = %stdout, "Counter finished");

        // Counters conventionally exit 10/20 on SAT/UNSAT, so the status is
        // only informational
        Ok(match parse_counter_output(&stdout) {
            Some(count) => CountOutcome::Count(count),
            None => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                CountOutcome::Unrecognized(format!(
                    "exit {}: {}",
                    output.status,
                    stderr.lines().last().unwrap_or_default()
                ))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arbitrary_precision_line() {
        let out = "c o Some header\nc o exact arb 123456789012345678901234567890\n";
        assert_eq!(
            parse_counter_output(out).as_deref(),
            Some("123456789012345678901234567890")
        );
    }

    #[test]
    fn test_parse_solution_line() {
        let out = "s SATISFIABLE\nc s type mc\nc s exact arb int 42\n";
        assert_eq!(parse_counter_output(out).as_deref(), Some("42"));
    }

    #[test]
    fn test_parse_unsat() {
        assert_eq!(parse_counter_output("s UNSATISFIABLE\n").as_deref(), Some("0"));
    }

    #[test]
    fn test_parse_nothing() {
        assert_eq!(parse_counter_output("c o crashed\n"), None);
        assert_eq!(parse_counter_output(""), None);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let counter = ExternalCounter::new("/nonexistent/hydrasat-counter");
        let result = counter.count("p cnf 1 0\n", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(WorkerError::CounterSpawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_counter_reads_input() {
        // `sh -c script sh <file>`: the script sees the input path as $1
        let counter = ExternalCounter::new("sh").with_args([
            "-c",
            "grep -q '^p cnf 2 1$' \"$1\" && echo 'c s exact arb int 3'",
            "sh",
        ]);
        let outcome = counter.count("p cnf 2 1\n1 2 0\n", Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome, CountOutcome::Count("3".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_budget_exceeded() {
        let counter = ExternalCounter::new("sh").with_args(["-c", "sleep 5", "sh"]);
        let outcome = counter.count("p cnf 1 0\n", Duration::from_millis(50)).await.unwrap();
        assert_eq!(outcome, CountOutcome::TimedOut);
    }
}
