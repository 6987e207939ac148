use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::{CoreError, Member, MemberId, MemberRepository};

/// In-memory member store. Ids come from a sequence owned by the store and
/// start at 1; the map and the sequence share one mutex.
pub struct MemoryMemberRepository {
    inner: Mutex<Store>,
}

#[derive(Default)]
struct Store {
    members: BTreeMap<MemberId, Member>,
    sequence: u64,
}

impl MemoryMemberRepository {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Store::default()),
        }
    }

    fn store(&self) -> Result<MutexGuard<'_, Store>, CoreError> {
        self.inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))
    }

    /// Drop every member and rewind the id sequence.
    #[cfg(test)]
    pub(crate) fn clear_store(&self) {
        if let Ok(mut store) = self.inner.lock() {
            store.members.clear();
            store.sequence = 0;
        }
    }
}

impl Default for MemoryMemberRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemberRepository for MemoryMemberRepository {
    fn save(&self, member: Member) -> Result<Member, CoreError> {
        let mut store = self.store()?;
        store.sequence += 1;
        let id = MemberId::new(store.sequence);
        let saved = member.with_id(id);
        store.members.insert(id, saved.clone());
        Ok(saved)
    }

    fn find_by_id(&self, id: MemberId) -> Result<Option<Member>, CoreError> {
        let store = self.store()?;
        Ok(store.members.get(&id).cloned())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Member>, CoreError> {
        let store = self.store()?;
        Ok(store.members.values().find(|m| m.name == name).cloned())
    }

    fn find_all(&self) -> Result<Vec<Member>, CoreError> {
        let store = self.store()?;
        Ok(store.members.values().cloned().collect())
    }
}
