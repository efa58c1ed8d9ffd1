//! DIMACS CNF loading
//!
//! The coordinator never looks inside clauses. It only needs the header
//! counts and the clause text, which is forwarded verbatim to every worker.

use serde::Serialize;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Read-only snapshot of a CNF formula, shared by every dispatched task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormulaView {
    /// Variable count from the `p cnf` header
    pub num_vars: i32,

    /// Clause count from the `p cnf` header
    pub num_clauses: i32,

    /// Clause lines with comments, blank lines and the header removed
    pub body: String,
}

impl FormulaView {
    /// Load and normalize a `.cnf` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FormulaError> {
        let path = path.as_ref();

        if path.extension().and_then(|e| e.to_str()) != Some("cnf") {
            return Err(FormulaError::InvalidFormat {
                path: path.to_path_buf(),
                reason: "expected a .cnf file".to_string(),
            });
        }
        if !path.exists() {
            return Err(FormulaError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let text = std::fs::read_to_string(path).map_err(|source| FormulaError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&text).map_err(|e| match e {
            FormulaError::InvalidFormat { reason, .. } => FormulaError::InvalidFormat {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Normalize DIMACS text already in memory
    pub fn parse(text: &str) -> Result<Self, FormulaError> {
        let mut header = None;
        let mut body = Vec::new();

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('c') {
                continue;
            }
            if line.starts_with('p') {
                if header.is_some() {
                    return Err(invalid(format!("duplicate problem line at line {}", lineno + 1)));
                }
                header = Some(parse_header(line, lineno + 1)?);
                continue;
            }
            body.push(line);
        }

        let (num_vars, num_clauses) =
            header.ok_or_else(|| invalid("missing 'p cnf' problem line".to_string()))?;

        Ok(Self {
            num_vars,
            num_clauses,
            body: body.join("\n"),
        })
    }

    /// Render the formula conjoined with the cube's literals as unit clauses
    pub fn with_cube(&self, literals: &[i32]) -> String {
        let clauses = self.num_clauses as usize + literals.len();
        let mut out = format!("p cnf {} {}\n", self.num_vars, clauses);
        if !self.body.is_empty() {
            out.push_str(&self.body);
            out.push('\n');
        }
        for lit in literals {
            out.push_str(&format!("{lit} 0\n"));
        }
        out
    }
}

fn parse_header(line: &str, lineno: usize) -> Result<(i32, i32), FormulaError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        ["p", "cnf", vars, clauses, ..] => {
            let vars = vars
                .parse::<i32>()
                .ok()
                .filter(|v| *v >= 0)
                .ok_or_else(|| invalid(format!("bad variable count '{vars}' at line {lineno}")))?;
            let clauses = clauses
                .parse::<i32>()
                .ok()
                .filter(|c| *c >= 0)
                .ok_or_else(|| invalid(format!("bad clause count '{clauses}' at line {lineno}")))?;
            Ok((vars, clauses))
        }
        _ => Err(invalid(format!("malformed problem line at line {lineno}: '{line}'"))),
    }
}

fn invalid(reason: String) -> FormulaError {
    FormulaError::InvalidFormat {
        path: PathBuf::new(),
        reason,
    }
}

/// Formula loading errors
#[derive(Error, Debug)]
pub enum FormulaError {
    #[error("Invalid formula file {}: {reason}", path.display())]
    InvalidFormat { path: PathBuf, reason: String },

    #[error("Formula file {} does not exist", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
