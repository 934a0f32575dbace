mod gate;

pub use gate::{ExecutionGate, GroupPermit};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GroupError;

/// Cells of one notebook that compile and run together as a single program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellGroup {
    pub group_id: String,
    pub notebook_scope: String,
    /// Compilation order; never fewer than two, never repeated
    pub cell_ids: Vec<String>,
}

/// The groups of one scope at a given revision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSnapshot {
    pub revision: u64,
    pub groups: BTreeMap<String, CellGroup>,
}

#[derive(Debug, Default)]
struct ScopeState {
    revision: u64,
    groups: BTreeMap<String, CellGroup>,
    /// cell id -> group id
    membership: HashMap<String, String>,
}

impl ScopeState {
    fn new_group_id(&self) -> String {
        loop {
            let id = format!("group-{}", &Uuid::new_v4().simple().to_string()[..8]);
            if !self.groups.contains_key(&id) {
                return id;
            }
        }
    }

    /// Inserts `cell` into an existing group, placed `offset` after `anchor`
    fn insert_next_to(
        &mut self,
        group_id: &str,
        anchor: &str,
        cell: &str,
        offset: usize,
    ) -> Result<CellGroup, GroupError> {
        let group = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| GroupError::UnknownGroup(group_id.to_string()))?;
        let index = group
            .cell_ids
            .iter()
            .position(|c| c == anchor)
            .map_or(group.cell_ids.len(), |i| i + offset);
        group.cell_ids.insert(index, cell.to_string());
        let group = group.clone();
        self.membership.insert(cell.to_string(), group_id.to_string());
        Ok(group)
    }
}

/// Tracks which cells are grouped, per notebook scope.
///
/// Scopes are independent and each is locked on its own, so edits to one
/// notebook never wait on another.
#[derive(Debug, Default)]
pub struct CellGroupRegistry {
    scopes: RwLock<HashMap<String, Arc<Mutex<ScopeState>>>>,
}

impl CellGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn scope(&self, scope: &str) -> Arc<Mutex<ScopeState>> {
        if let Some(state) = self.scopes.read().get(scope) {
            return Arc::clone(state);
        }
        Arc::clone(self.scopes.write().entry(scope.to_string()).or_default())
    }

    fn existing_scope(&self, scope: &str) -> Option<Arc<Mutex<ScopeState>>> {
        self.scopes.read().get(scope).cloned()
    }

    /// Puts `cell_a` and `cell_b` in the same group and returns that group.
    ///
    /// A cell joining an existing group is placed next to its partner: after
    /// `cell_a`, or before `cell_b`. Two cells that already share a group
    /// leave the registry untouched.
    pub fn connect(&self, scope: &str, cell_a: &str, cell_b: &str) -> Result<CellGroup, GroupError> {
        if cell_a == cell_b {
            return Err(GroupError::SameCell(cell_a.to_string()));
        }

        let state = self.scope(scope);
        let mut state = state.lock();
        let group_a = state.membership.get(cell_a).cloned();
        let group_b = state.membership.get(cell_b).cloned();

        let group = match (group_a, group_b) {
            (None, None) => {
                let group_id = state.new_group_id();
                let group = CellGroup {
                    group_id: group_id.clone(),
                    notebook_scope: scope.to_string(),
                    cell_ids: vec![cell_a.to_string(), cell_b.to_string()],
                };
                state.membership.insert(cell_a.to_string(), group_id.clone());
                state.membership.insert(cell_b.to_string(), group_id.clone());
                state.groups.insert(group_id, group.clone());
                group
            }
            (Some(group_id), None) => state.insert_next_to(&group_id, cell_a, cell_b, 1)?,
            (None, Some(group_id)) => state.insert_next_to(&group_id, cell_b, cell_a, 0)?,
            (Some(a), Some(b)) if a == b => {
                return state
                    .groups
                    .get(&a)
                    .cloned()
                    .ok_or(GroupError::UnknownGroup(a));
            }
            (Some(_), Some(_)) => {
                return Err(GroupError::AlreadyInDifferentGroup {
                    cell_a: cell_a.to_string(),
                    cell_b: cell_b.to_string(),
                });
            }
        };

        state.revision += 1;
        log::info!(
            "[{scope}] connected {cell_a} and {cell_b} in {} ({} cells)",
            group.group_id,
            group.cell_ids.len()
        );
        Ok(group)
    }

    /// Removes `cell` from its group.
    ///
    /// Returns the group as it stands afterwards, or `None` when it dropped
    /// below two members and was deleted.
    pub fn disconnect(&self, scope: &str, cell: &str) -> Result<Option<CellGroup>, GroupError> {
        let not_grouped = || GroupError::NotGrouped(cell.to_string());
        let state = self.existing_scope(scope).ok_or_else(not_grouped)?;
        let mut state = state.lock();

        let group_id = state.membership.remove(cell).ok_or_else(not_grouped)?;
        let Some(mut group) = state.groups.remove(&group_id) else {
            return Err(GroupError::UnknownGroup(group_id));
        };
        group.cell_ids.retain(|c| c != cell);
        state.revision += 1;

        if group.cell_ids.len() < 2 {
            for orphan in &group.cell_ids {
                state.membership.remove(orphan);
            }
            log::info!("[{scope}] disconnected {cell}, deleted {group_id}");
            return Ok(None);
        }

        log::info!("[{scope}] disconnected {cell} from {group_id}");
        state.groups.insert(group_id, group.clone());
        Ok(Some(group))
    }

    pub fn group_for(&self, scope: &str, cell: &str) -> Option<CellGroup> {
        let state = self.existing_scope(scope)?;
        let state = state.lock();
        let group_id = state.membership.get(cell)?;
        state.groups.get(group_id).cloned()
    }

    pub fn group(&self, scope: &str, group_id: &str) -> Option<CellGroup> {
        let state = self.existing_scope(scope)?;
        let state = state.lock();
        state.groups.get(group_id).cloned()
    }

    pub fn list_groups(&self, scope: &str) -> BTreeMap<String, CellGroup> {
        let Some(state) = self.existing_scope(scope) else {
            return BTreeMap::new();
        };
        let groups = state.lock().groups.clone();
        groups
    }

    pub fn snapshot(&self, scope: &str) -> ScopeSnapshot {
        let Some(state) = self.existing_scope(scope) else {
            return ScopeSnapshot::default();
        };
        let state = state.lock();
        ScopeSnapshot {
            revision: state.revision,
            groups: state.groups.clone(),
        }
    }

    /// Replaces the contents of `scope` with a previously taken snapshot
    pub fn restore(&self, scope: &str, snapshot: ScopeSnapshot) {
        let membership = snapshot
            .groups
            .values()
            .flat_map(|g| g.cell_ids.iter().map(|c| (c.clone(), g.group_id.clone())))
            .collect();
        let state = self.scope(scope);
        *state.lock() = ScopeState {
            revision: snapshot.revision,
            groups: snapshot.groups,
            membership,
        };
    }

    /// Names of every scope that has been touched
    #[cfg(test)]
    pub fn scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self.scopes.read().keys().cloned().collect();
        scopes.sort();
        scopes
    }
}
