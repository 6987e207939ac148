//! Member repository written directly against `rusqlite`.
//!
//! Each operation is one round trip: acquire the connection, prepare the
//! statement, walk the cursor, then release cursor, statement and connection
//! in that order whether or not the operation succeeded.

use std::sync::Arc;

use domain::{CoreError, Member, MemberId, MemberRepository};
use rusqlite::{params, Row, Statement};

use crate::{close_statement, id_column, id_from_raw, raw_from_id, DataAccessError, DataSource};

const INSERT_MEMBER: &str = "INSERT INTO member(name) VALUES (?1) RETURNING id";
const SELECT_BY_ID: &str = "SELECT id, name FROM member WHERE id = ?1";
const SELECT_BY_NAME: &str = "SELECT id, name FROM member WHERE name = ?1 ORDER BY id LIMIT 1";
const SELECT_ALL: &str = "SELECT id, name FROM member";

/// SQLite-backed repository with hand-managed statement resources.
pub struct SqliteMemberRepository {
    data_source: Arc<DataSource>,
}

impl SqliteMemberRepository {
    pub fn new(data_source: Arc<DataSource>) -> Self {
        Self { data_source }
    }
}

impl MemberRepository for SqliteMemberRepository {
    fn save(&self, member: Member) -> Result<Member, CoreError> {
        let conn = self.data_source.connection()?;
        let mut stmt = conn.prepare(INSERT_MEMBER).map_err(DataAccessError::from)?;
        let key = read_generated_key(&mut stmt, &member.name);
        close_statement(stmt);

        let id = id_from_raw(key?).map_err(DataAccessError::from)?;
        Ok(member.with_id(id))
    }

    fn find_by_id(&self, id: MemberId) -> Result<Option<Member>, CoreError> {
        let Some(raw) = raw_from_id(id) else {
            return Ok(None);
        };
        let conn = self.data_source.connection()?;
        let mut stmt = conn.prepare(SELECT_BY_ID).map_err(DataAccessError::from)?;
        let found = read_first(&mut stmt, raw);
        close_statement(stmt);
        Ok(found?)
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Member>, CoreError> {
        let conn = self.data_source.connection()?;
        let mut stmt = conn.prepare(SELECT_BY_NAME).map_err(DataAccessError::from)?;
        let found = read_first(&mut stmt, name);
        close_statement(stmt);
        Ok(found?)
    }

    fn find_all(&self) -> Result<Vec<Member>, CoreError> {
        let conn = self.data_source.connection()?;
        let mut stmt = conn.prepare(SELECT_ALL).map_err(DataAccessError::from)?;
        let members = read_all(&mut stmt);
        close_statement(stmt);
        Ok(members?)
    }
}

fn read_generated_key(stmt: &mut Statement<'_>, name: &str) -> Result<i64, DataAccessError> {
    let mut rows = stmt.query(params![name])?;
    match rows.next()? {
        Some(row) => Ok(row.get(0)?),
        None => Err(DataAccessError::MissingGeneratedKey {
            table: "member".into(),
        }),
    }
}

fn read_first<P: rusqlite::ToSql>(
    stmt: &mut Statement<'_>,
    key: P,
) -> Result<Option<Member>, DataAccessError> {
    let mut rows = stmt.query(params![key])?;
    match rows.next()? {
        Some(row) => Ok(Some(read_member(row)?)),
        None => Ok(None),
    }
}

fn read_all(stmt: &mut Statement<'_>) -> Result<Vec<Member>, DataAccessError> {
    let mut rows = stmt.query([])?;
    let mut members = Vec::new();
    while let Some(row) = rows.next()? {
        members.push(read_member(row)?);
    }
    Ok(members)
}

fn read_member(row: &Row<'_>) -> Result<Member, rusqlite::Error> {
    let id = id_column(row)?;
    let name: String = row.get("name")?;
    Ok(Member::new(name).with_id(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::service::MemberService;

    fn tmp_repo() -> (SqliteMemberRepository, Arc<DataSource>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ds = Arc::new(DataSource::open(dir.path().join("t.db")).unwrap());
        (SqliteMemberRepository::new(Arc::clone(&ds)), ds, dir)
    }

    #[test]
    fn save_then_find_by_id() {
        let (repo, _ds, _dir) = tmp_repo();
        let saved = repo.save(Member::new("Spring")).unwrap();
        assert_eq!(saved.id, Some(MemberId::new(1)));

        let got = repo.find_by_id(MemberId::new(1)).unwrap().unwrap();
        assert_eq!(got.name, "Spring");
        assert_eq!(got, saved);
    }

    #[test]
    fn find_by_id_missing_is_none() {
        let (repo, _ds, _dir) = tmp_repo();
        assert!(repo.find_by_id(MemberId::new(999)).unwrap().is_none());
        assert!(repo.find_by_id(MemberId::new(u64::MAX)).unwrap().is_none());
    }

    #[test]
    fn find_by_name_and_missing_name() {
        let (repo, _ds, _dir) = tmp_repo();
        repo.save(Member::new("spring1")).unwrap();
        repo.save(Member::new("spring2")).unwrap();

        let got = repo.find_by_name("spring1").unwrap().unwrap();
        assert_eq!(got.id, Some(MemberId::new(1)));
        assert!(repo.find_by_name("nobody").unwrap().is_none());
    }

    #[test]
    fn find_all_counts_saves() {
        let (repo, _ds, _dir) = tmp_repo();
        for i in 0..5 {
            repo.save(Member::new(format!("m{i}"))).unwrap();
        }
        let all = repo.find_all().unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.iter().all(Member::is_persisted));
    }

    #[test]
    fn repeated_save_yields_distinct_ids() {
        let (repo, _ds, _dir) = tmp_repo();
        let m = Member::new("twin");
        let a = repo.save(m.clone()).unwrap();
        let b = repo.save(m).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(repo.find_by_name("twin").unwrap().unwrap().id, a.id);
    }

    #[test]
    fn insert_without_generated_key_fails() {
        let (repo, ds, _dir) = tmp_repo();
        ds.connection()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER skip_ghost BEFORE INSERT ON member WHEN NEW.name = 'ghost'
                 BEGIN SELECT RAISE(IGNORE); END;",
            )
            .unwrap();

        let err = repo.save(Member::new("ghost")).unwrap_err();
        match err {
            CoreError::Repository(msg) => assert!(msg.contains("no generated key")),
            other => panic!("unexpected {other:?}"),
        }
        // connection was released, so the next call still works
        assert!(repo.find_all().unwrap().is_empty());
    }

    #[test]
    fn sql_failure_becomes_repository_error() {
        let (repo, ds, _dir) = tmp_repo();
        ds.connection()
            .unwrap()
            .execute_batch("DROP TABLE member")
            .unwrap();

        assert!(matches!(
            repo.find_all(),
            Err(CoreError::Repository(_))
        ));
        assert!(matches!(
            repo.save(Member::new("x")),
            Err(CoreError::Repository(_))
        ));
    }

    #[test]
    fn service_rejects_duplicate_over_sqlite() {
        let (repo, _ds, _dir) = tmp_repo();
        let svc = MemberService::new(repo);
        let id = svc.join(Member::new("test")).unwrap();
        assert_eq!(svc.find_one(id).unwrap().unwrap().name, "test");

        let err = svc.join(Member::new("test")).unwrap_err();
        assert_eq!(err.to_string(), "member already exists");
        assert_eq!(svc.find_members().unwrap().len(), 1);
    }
}
