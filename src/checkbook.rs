//! Checkbook of outstanding tasks
//!
//! Maps task identities to the cube each task covers. An entry exists from
//! the moment a cube is registered for dispatch until its result is accepted
//! or it is superseded by a split. Identities are allocated under the same
//! lock as the map so that registration and resolution never interleave.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::cube::Cube;

/// Task identity. Strictly increasing, never reused.
pub type TaskId = i64;

/// Sentinel task id returned to workers when no work is available
pub const NO_WORK_TASK_ID: TaskId = -1;

#[derive(Debug, Default)]
struct CheckbookState {
    next_id: TaskId,
    entries: HashMap<TaskId, Cube>,
}

/// Registry of outstanding tasks
#[derive(Debug, Default)]
pub struct Checkbook {
    state: Mutex<CheckbookState>,
}

impl Checkbook {
    /// Create an empty checkbook; the first id handed out is 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next task id and record the cube under it
    pub fn register(&self, cube: Cube) -> TaskId {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.entries.insert(id, cube);
        id
    }

    /// Remove and return the cube for `task_id`.
    ///
    /// `None` when the task is not outstanding: already resolved, re-split,
    /// or never issued.
    pub fn resolve(&self, task_id: TaskId) -> Option<Cube> {
        self.lock().entries.remove(&task_id)
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.lock().entries.contains_key(&task_id)
    }

    /// Number of outstanding tasks
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next id that will be handed out (equals the number ever issued)
    pub fn issued(&self) -> TaskId {
        self.lock().next_id
    }

    /// Outstanding entries ordered by task id
    pub fn snapshot(&self) -> Vec<CheckbookEntry> {
        let state = self.lock();
        let mut entries: Vec<CheckbookEntry> = state
            .entries
            .iter()
            .map(|(&task_id, cube)| CheckbookEntry {
                task_id,
                cube: cube.clone(),
            })
            .collect();
        entries.sort_by_key(|e| e.task_id);
        entries
    }

    // The critical sections never panic, so a poisoned lock still holds a
    // consistent map.
    fn lock(&self) -> std::sync::MutexGuard<'_, CheckbookState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One outstanding task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckbookEntry {
    pub task_id: TaskId,
    pub cube: Cube,
}
