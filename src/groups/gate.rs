use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::GroupError;

type GroupKey = (String, String);

/// Admits at most one run per group at a time
#[derive(Debug, Default, Clone)]
pub struct ExecutionGate {
    running: Arc<Mutex<HashSet<GroupKey>>>,
}

impl ExecutionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `group_id` in `scope` until the returned permit is dropped
    pub fn try_acquire(&self, scope: &str, group_id: &str) -> Result<GroupPermit, GroupError> {
        let key = (scope.to_string(), group_id.to_string());
        if !self.running.lock().insert(key.clone()) {
            log::debug!("[{scope}] rejected concurrent run of {group_id}");
            return Err(GroupError::GroupBusy(group_id.to_string()));
        }
        Ok(GroupPermit {
            key,
            running: Arc::clone(&self.running),
        })
    }

    #[cfg(test)]
    pub fn is_running(&self, scope: &str, group_id: &str) -> bool {
        self.running
            .lock()
            .contains(&(scope.to_string(), group_id.to_string()))
    }
}

#[derive(Debug)]
pub struct GroupPermit {
    key: GroupKey,
    running: Arc<Mutex<HashSet<GroupKey>>>,
}

impl Drop for GroupPermit {
    fn drop(&mut self) {
        self.running.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected_until_release() {
        let gate = ExecutionGate::new();
        let permit = gate.try_acquire("nb", "group-1").unwrap();

        assert_eq!(
            gate.try_acquire("nb", "group-1").unwrap_err(),
            GroupError::GroupBusy("group-1".to_string())
        );
        assert!(gate.is_running("nb", "group-1"));

        drop(permit);
        assert!(!gate.is_running("nb", "group-1"));
        assert!(gate.try_acquire("nb", "group-1").is_ok());
    }

    #[test]
    fn test_groups_and_scopes_do_not_block_each_other() {
        let gate = ExecutionGate::new();
        let _a = gate.try_acquire("nb", "group-1").unwrap();
        let _b = gate.try_acquire("nb", "group-2").unwrap();
        let _c = gate.try_acquire("other", "group-1").unwrap();
    }
}
