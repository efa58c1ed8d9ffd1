//! Common test utilities

use std::time::Duration;

use async_trait::async_trait;
use hydrasat::coordinator::CoordinatorConfig;
use hydrasat::cube::Cube;
use hydrasat::formula::FormulaView;
use hydrasat::worker::{CountOutcome, ModelCounter, WorkerError};

/// Six-variable formula used across the integration tests
pub const FORMULA: &str = "c integration fixture\n\
                           p cnf 6 5\n\
                           1 -2 0\n\
                           2 3 -4 0\n\
                           -1 5 0\n\
                           4 -6 0\n\
                           -3 -5 6 0\n";

pub fn formula() -> FormulaView {
    FormulaView::parse(FORMULA).unwrap()
}

/// Fast-polling config bound to an ephemeral local port
pub fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig::builder()
        .bind_address_str("127.0.0.1:0")
        .unwrap()
        .poll_window_ms(20)
        .enable_request_logging(false)
        .build()
        .unwrap()
}

#[allow(dead_code)]
pub fn cube(lits: &[i32]) -> Cube {
    Cube::new(lits.to_vec()).unwrap()
}

/// Parse DIMACS text into (num_vars, clauses)
pub fn parse_dimacs(text: &str) -> (usize, Vec<Vec<i32>>) {
    let mut num_vars = 0;
    let mut clauses = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('c') {
            continue;
        }
        if line.starts_with('p') {
            num_vars = line.split_whitespace().nth(2).unwrap().parse().unwrap();
            continue;
        }
        let clause: Vec<i32> = line
            .split_whitespace()
            .map(|t| t.parse().unwrap())
            .take_while(|&lit| lit != 0)
            .collect();
        clauses.push(clause);
    }
    (num_vars, clauses)
}

/// Models of `clauses` that also satisfy `cube`, by enumeration
pub fn count_models(num_vars: usize, clauses: &[Vec<i32>], cube: &Cube) -> u64 {
    let mut count = 0;
    for mask in 0u64..(1 << num_vars) {
        let assignment: Vec<bool> = (0..num_vars).map(|i| mask & (1 << i) != 0).collect();
        let satisfied = clauses.iter().all(|clause| {
            clause
                .iter()
                .any(|&lit| assignment[lit.unsigned_abs() as usize - 1] == (lit > 0))
        });
        if satisfied && cube.admits(&assignment) {
            count += 1;
        }
    }
    count
}

/// Exact count of [`FORMULA`]
pub fn expected_total() -> u64 {
    let (num_vars, clauses) = parse_dimacs(FORMULA);
    count_models(num_vars, &clauses, &Cube::root())
}

/// In-process counter: enumerates assignments, but "times out" on any cube
/// with fewer than `min_cube` literals so the coordinator has to split
#[allow(dead_code)]
pub struct BruteForceCounter {
    pub base_clauses: usize,
    pub min_cube: usize,
}

#[async_trait]
impl ModelCounter for BruteForceCounter {
    fn name(&self) -> &str {
        "brute-force"
    }

    async fn count(&self, dimacs: &str, _budget: Duration) -> Result<CountOutcome, WorkerError> {
        let (num_vars, clauses) = parse_dimacs(dimacs);
        if clauses.len() - self.base_clauses < self.min_cube {
            return Ok(CountOutcome::TimedOut);
        }
        let count = count_models(num_vars, &clauses, &Cube::root());
        Ok(CountOutcome::Count(count.to_string()))
    }
}
