use std::sync::Mutex;

use crate::{CoreError, Member, MemberId, MemberRepository};

/// Application service for member registration.
///
/// Generic over the repository so the same rules run against the in-memory
/// store and the SQL adapters. Name uniqueness is enforced here, not in
/// storage: `join` holds a single-writer lock across the duplicate lookup and
/// the save, so two joins with the same name cannot both pass the check.
pub struct MemberService<R: MemberRepository> {
    repo: R,
    join_lock: Mutex<()>,
}

impl<R: MemberRepository> MemberService<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            join_lock: Mutex::new(()),
        }
    }

    /// Register a member and return its assigned id.
    pub fn join(&self, member: Member) -> Result<MemberId, CoreError> {
        let _writer = self
            .join_lock
            .lock()
            .map_err(|_| CoreError::Repository("join lock poisoned".into()))?;

        self.validate_duplicate_member(&member)?;
        let saved = self.repo.save(member)?;
        saved
            .id
            .ok_or_else(|| CoreError::Repository("saved member has no id".into()))
    }

    fn validate_duplicate_member(&self, member: &Member) -> Result<(), CoreError> {
        match self.repo.find_by_name(&member.name)? {
            Some(_) => Err(CoreError::DuplicateMember),
            None => Ok(()),
        }
    }

    pub fn find_one(&self, id: MemberId) -> Result<Option<Member>, CoreError> {
        self.repo.find_by_id(id)
    }

    pub fn find_members(&self) -> Result<Vec<Member>, CoreError> {
        self.repo.find_all()
    }

    #[cfg(test)]
    pub(crate) fn repository(&self) -> &R {
        &self.repo
    }
}
