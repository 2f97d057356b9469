use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// One mutex per user id. Holding a user's slot serializes every mutating operation for
/// that user while other users proceed in parallel.
#[derive(Debug, Default)]
pub(crate) struct UserLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub(crate) fn slot(&self, user_id: &str) -> Arc<Mutex<()>> {
        // The map only holds unit mutexes, so a poisoned lock has nothing to corrupt.
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
