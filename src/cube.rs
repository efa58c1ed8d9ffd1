//! Cubes, the splitter, and the initial partition
//!
//! A cube is a partial truth assignment written as an ordered sequence of
//! DIMACS literals. Cube-and-conquer relies on one property of the
//! operations in this module: every split replaces a cube by two disjoint
//! cubes whose union is exactly the parent's assignment set, so counts of
//! the leaves always sum to the count of the root.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A signed variable reference. Magnitude is the 1-based variable index,
/// the sign is the polarity. Zero is never valid.
pub type Literal = i32;

/// A partial assignment (conjunction of literals)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Literal>", into = "Vec<Literal>")]
pub struct Cube {
    literals: Vec<Literal>,
}

impl Cube {
    /// The empty cube, covering the whole assignment space
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a cube from literals, rejecting the invalid literal `0`
    pub fn new(literals: Vec<Literal>) -> Result<Self, CubeError> {
        if let Some(pos) = literals.iter().position(|&l| l == 0) {
            return Err(CubeError::ZeroLiteral { position: pos });
        }
        if literals.iter().any(|&l| l == Literal::MIN) {
            return Err(CubeError::OutOfRange);
        }
        Ok(Self { literals })
    }

    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    /// Largest variable index mentioned by the cube (0 for the root cube)
    pub fn max_variable(&self) -> u32 {
        self.literals
            .iter()
            .map(|l| l.unsigned_abs())
            .max()
            .unwrap_or(0)
    }

    /// Variable the splitter would branch on next
    pub fn next_variable(&self) -> u32 {
        self.max_variable() + 1
    }

    /// Variable to branch on inside a formula over `1..=num_vars`.
    ///
    /// The variable after the largest one while that still exists in the
    /// formula, otherwise the lowest unassigned variable. `None` once every
    /// variable is assigned.
    pub fn branch_variable(&self, num_vars: u32) -> Option<u32> {
        let next = self.next_variable();
        if next <= num_vars {
            return Some(next);
        }
        let assigned: HashSet<u32> = self.literals.iter().map(|l| l.unsigned_abs()).collect();
        (1..=num_vars).find(|var| !assigned.contains(var))
    }

    /// Whether a full assignment (`assignment[i]` is variable `i + 1`)
    /// satisfies every literal of this cube.
    ///
    /// Variables outside the assignment are treated as unconstrained-false,
    /// so callers should pass an assignment at least `max_variable()` long.
    pub fn admits(&self, assignment: &[bool]) -> bool {
        self.literals.iter().all(|&lit| {
            let idx = lit.unsigned_abs() as usize - 1;
            let value = assignment.get(idx).copied().unwrap_or(false);
            value == (lit > 0)
        })
    }

    /// New cube with one more literal appended; the receiver is untouched
    fn extended(&self, literal: Literal) -> Self {
        let mut literals = Vec::with_capacity(self.literals.len() + 1);
        literals.extend_from_slice(&self.literals);
        literals.push(literal);
        Self { literals }
    }
}

impl TryFrom<Vec<Literal>> for Cube {
    type Error = CubeError;

    fn try_from(literals: Vec<Literal>) -> Result<Self, Self::Error> {
        Self::new(literals)
    }
}

impl From<Cube> for Vec<Literal> {
    fn from(cube: Cube) -> Self {
        cube.literals
    }
}

impl fmt::Display for Cube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, lit) in self.literals.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{lit}")?;
        }
        write!(f, "]")
    }
}

// ============================================================================
// Splitter
// ============================================================================

/// Split a cube on the variable following its largest one.
///
/// Returns `(positive, negative)`: the parent extended with `v` and with
/// `-v` where `v = max_variable + 1`. Deterministic, no shared state.
pub fn split(cube: &Cube) -> (Cube, Cube) {
    split_on(cube, cube.next_variable())
}

/// Split a cube on an explicit variable, which must not already be assigned
pub fn split_on(cube: &Cube, var: u32) -> (Cube, Cube) {
    let var = var as Literal;
    (cube.extended(var), cube.extended(-var))
}

/// All `2^depth` sign combinations over variables `1..=depth`.
///
/// Ordered the same way repeated splitting from the root would list the
/// leaves, positive branch first: for depth 2 this is
/// `[1 2]`, `[1 -2]`, `[-1 2]`, `[-1 -2]`.
pub fn initial_partition(depth: u32) -> Vec<Cube> {
    let mut frontier = vec![Cube::root()];
    for _ in 0..depth {
        frontier = frontier
            .iter()
            .flat_map(|cube| {
                let (pos, neg) = split(cube);
                [pos, neg]
            })
            .collect();
    }
    frontier
}

// ============================================================================
// Errors
// ============================================================================

/// Cube construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CubeError {
    #[error("Literal 0 at position {position} is not a valid literal")]
    ZeroLiteral { position: usize },

    #[error("Literal magnitude out of range")]
    OutOfRange,
}

// ============================================================================
// Tests
// ============================================================================
