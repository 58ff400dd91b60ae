use std::{
    collections::HashMap,
    sync::{Arc, Mutex as SyncMutex, PoisonError},
};

use rocket::tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

use crate::model::mongodb::Id;

/// Per-voter exclusive locks, so that at most one ballot submission for any
/// given voter is in flight at a time.
#[derive(Default)]
pub struct VoterLocks {
    locks: SyncMutex<HashMap<Id, Arc<Mutex<()>>>>,
}

impl VoterLocks {
    /// Wait for exclusive access on behalf of the given voter. Access is held
    /// until the returned guard is dropped.
    pub async fn lock(&self, voter_id: Id) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Forget locks that nobody holds or waits on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(voter_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Serializes passes that renumber position priorities.
#[derive(Default)]
pub struct RenumberLock(Mutex<()>);

impl RenumberLock {
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.0.lock().await
    }
}
