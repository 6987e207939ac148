//! Domain library for the member registry.
//!
//! This crate is dependency-free (inherits workspace metadata only) and holds
//! the member entity, the repository port, and error definitions. Keep
//! adapters and IO concerns out of this crate.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Storage-assigned identifier of a persisted member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberId(u64);

impl MemberId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Display for MemberId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered member.
///
/// `id` is `None` until the member has been handed to
/// [`MemberRepository::save`], which returns the persisted copy with the id
/// filled in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub id: Option<MemberId>,
    pub name: String,
}

impl Member {
    /// Create a transient (not yet persisted) member.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    /// Copy of this member carrying the given storage id.
    pub fn with_id(self, id: MemberId) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

/// Repository port for persisting and loading members.
///
/// The port does not enforce name uniqueness; saving the same transient
/// member twice stores two records with distinct ids.
pub trait MemberRepository: Send + Sync {
    /// Persist a member and return it with its assigned id.
    fn save(&self, member: Member) -> Result<Member, CoreError>;
    fn find_by_id(&self, id: MemberId) -> Result<Option<Member>, CoreError>;
    /// First member with exactly this name, if any.
    fn find_by_name(&self, name: &str) -> Result<Option<Member>, CoreError>;
    fn find_all(&self) -> Result<Vec<Member>, CoreError>;
}

/// Core domain errors (no external error crates to keep deps at zero).
#[derive(Debug)]
pub enum CoreError {
    /// A member with the same name is already registered.
    DuplicateMember,
    Repository(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::DuplicateMember => write!(f, "member already exists"),
            CoreError::Repository(msg) => write!(f, "repository error: {}", msg),
        }
    }
}

impl Error for CoreError {}

/// Return a short about/version line for the binary to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{} - member registry domain", pkg, ver)
}

pub mod adapters;
pub mod service;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_member_is_transient() {
        let m = Member::new("Spring");
        assert_eq!(m.name, "Spring");
        assert!(m.id.is_none());
        assert!(!m.is_persisted());
    }

    #[test]
    fn with_id_keeps_name() {
        let m = Member::new("Spring").with_id(MemberId::new(7));
        assert_eq!(m.id, Some(MemberId::new(7)));
        assert_eq!(m.name, "Spring");
        assert!(m.is_persisted());
    }

    #[test]
    fn duplicate_error_message() {
        assert_eq!(CoreError::DuplicateMember.to_string(), "member already exists");
        let err = CoreError::Repository("disk full".into());
        assert_eq!(err.to_string(), "repository error: disk full");
    }

    #[test]
    fn member_id_displays_number() {
        assert_eq!(MemberId::new(42).to_string(), "42");
        assert_eq!(MemberId::new(42).get(), 42);
    }
}
