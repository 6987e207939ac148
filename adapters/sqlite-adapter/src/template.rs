//! Query helpers that own statement handling, and the member repository built
//! on them.
//!
//! [`SqlTemplate`] runs a query and maps every row through a caller-supplied
//! function; [`SimpleInsert`] builds an `INSERT` from column/value pairs and
//! hands back the generated key. Resource cleanup lives in the helpers, so the
//! repository only states SQL and mapping.

use std::sync::Arc;

use domain::{CoreError, Member, MemberId, MemberRepository};
use rusqlite::{params, Params, Row, Statement, ToSql};

use crate::{close_statement, id_column, id_from_raw, raw_from_id, DataAccessError, DataSource};

/// Runs SQL against a [`DataSource`], releasing statement and connection
/// after every call.
#[derive(Clone)]
pub struct SqlTemplate {
    data_source: Arc<DataSource>,
}

impl SqlTemplate {
    pub fn new(data_source: Arc<DataSource>) -> Self {
        Self { data_source }
    }

    /// Run a query and map each row.
    pub fn query<T, P, F>(&self, sql: &str, params: P, row_mapper: F) -> Result<Vec<T>, DataAccessError>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.data_source.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = map_rows(&mut stmt, params, row_mapper);
        close_statement(stmt);
        rows
    }

    /// Like [`SqlTemplate::query`] but stops reading after the first row.
    pub fn query_first<T, P, F>(
        &self,
        sql: &str,
        params: P,
        row_mapper: F,
    ) -> Result<Option<T>, DataAccessError>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.data_source.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let first = map_first(&mut stmt, params, row_mapper);
        close_statement(stmt);
        first
    }

    /// Execute a statement that returns no rows; yields the affected row count.
    pub fn update<P: Params>(&self, sql: &str, params: P) -> Result<usize, DataAccessError> {
        let conn = self.data_source.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let affected = stmt.execute(params);
        close_statement(stmt);
        Ok(affected?)
    }
}

fn map_rows<T, P, F>(stmt: &mut Statement<'_>, params: P, row_mapper: F) -> Result<Vec<T>, DataAccessError>
where
    P: Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let rows = stmt.query_map(params, row_mapper)?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(DataAccessError::from)
}

fn map_first<T, P, F>(stmt: &mut Statement<'_>, params: P, row_mapper: F) -> Result<Option<T>, DataAccessError>
where
    P: Params,
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut rows = stmt.query(params)?;
    match rows.next()? {
        Some(row) => Ok(Some(row_mapper(row)?)),
        None => Ok(None),
    }
}

/// Builder for single-row inserts that return the generated key.
///
/// ```ignore
/// let key = SimpleInsert::new(&template)
///     .with_table_name("member")
///     .using_generated_key_column("id")
///     .execute_and_return_key(&[("name", &name as &dyn ToSql)])?;
/// ```
pub struct SimpleInsert<'t> {
    template: &'t SqlTemplate,
    table: Option<String>,
    generated_key_column: Option<String>,
}

impl<'t> SimpleInsert<'t> {
    pub fn new(template: &'t SqlTemplate) -> Self {
        Self {
            template,
            table: None,
            generated_key_column: None,
        }
    }

    pub fn with_table_name(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn using_generated_key_column(mut self, column: &str) -> Self {
        self.generated_key_column = Some(column.to_string());
        self
    }

    /// Insert one row from `(column, value)` pairs and return the key the
    /// database generated for it.
    pub fn execute_and_return_key(
        &self,
        columns: &[(&str, &dyn ToSql)],
    ) -> Result<i64, DataAccessError> {
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| DataAccessError::InvalidUsage("table name not set".into()))?;
        let key_column = self.generated_key_column.as_deref().ok_or_else(|| {
            DataAccessError::InvalidUsage("generated key column not set".into())
        })?;
        if columns.is_empty() {
            return Err(DataAccessError::InvalidUsage("no columns to insert".into()));
        }
        for name in std::iter::once(table)
            .chain(std::iter::once(key_column))
            .chain(columns.iter().map(|(c, _)| *c))
        {
            if !is_identifier(name) {
                return Err(DataAccessError::InvalidUsage(format!(
                    "not a plain identifier: {name}"
                )));
            }
        }

        let names: Vec<&str> = columns.iter().map(|(c, _)| *c).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({}) RETURNING {key_column}",
            names.join(", "),
            placeholders.join(", ")
        );
        let values: Vec<&dyn ToSql> = columns.iter().map(|(_, v)| *v).collect();

        let conn = self.template.data_source.connection()?;
        let mut stmt = conn.prepare(&sql)?;
        let key = map_first(&mut stmt, values.as_slice(), |row| row.get::<_, i64>(0));
        close_statement(stmt);

        key?.ok_or_else(|| DataAccessError::MissingGeneratedKey {
            table: table.to_string(),
        })
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn member_row_mapper(row: &Row<'_>) -> rusqlite::Result<Member> {
    let id = id_column(row)?;
    let name: String = row.get("name")?;
    Ok(Member::new(name).with_id(id))
}

/// SQLite-backed repository built on [`SqlTemplate`] and [`SimpleInsert`].
pub struct TemplateMemberRepository {
    template: SqlTemplate,
}

impl TemplateMemberRepository {
    pub fn new(data_source: Arc<DataSource>) -> Self {
        Self {
            template: SqlTemplate::new(data_source),
        }
    }
}

impl MemberRepository for TemplateMemberRepository {
    fn save(&self, member: Member) -> Result<Member, CoreError> {
        let name: &dyn ToSql = &member.name;
        let key = SimpleInsert::new(&self.template)
            .with_table_name("member")
            .using_generated_key_column("id")
            .execute_and_return_key(&[("name", name)])?;
        let id = id_from_raw(key).map_err(DataAccessError::from)?;
        Ok(member.with_id(id))
    }

    fn find_by_id(&self, id: MemberId) -> Result<Option<Member>, CoreError> {
        let Some(raw) = raw_from_id(id) else {
            return Ok(None);
        };
        Ok(self.template.query_first(
            "SELECT id, name FROM member WHERE id = ?1 LIMIT 1",
            params![raw],
            member_row_mapper,
        )?)
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Member>, CoreError> {
        Ok(self.template.query_first(
            "SELECT id, name FROM member WHERE name = ?1 ORDER BY id LIMIT 1",
            params![name],
            member_row_mapper,
        )?)
    }

    fn find_all(&self) -> Result<Vec<Member>, CoreError> {
        Ok(self
            .template
            .query("SELECT id, name FROM member", [], member_row_mapper)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqliteMemberRepository;
    use domain::service::MemberService;

    fn tmp_repo() -> (TemplateMemberRepository, Arc<DataSource>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ds = Arc::new(DataSource::open(dir.path().join("t.db")).unwrap());
        (TemplateMemberRepository::new(Arc::clone(&ds)), ds, dir)
    }

    #[test]
    fn save_then_find_by_id() {
        let (repo, _ds, _dir) = tmp_repo();
        let saved = repo.save(Member::new("Spring")).unwrap();
        assert_eq!(saved.id, Some(MemberId::new(1)));

        let got = repo.find_by_id(MemberId::new(1)).unwrap().unwrap();
        assert_eq!(got.name, "Spring");
    }

    #[test]
    fn missing_rows_are_none() {
        let (repo, _ds, _dir) = tmp_repo();
        assert!(repo.find_by_id(MemberId::new(999)).unwrap().is_none());
        assert!(repo.find_by_name("nobody").unwrap().is_none());
    }

    #[test]
    fn find_all_and_distinct_ids() {
        let (repo, _ds, _dir) = tmp_repo();
        let m = Member::new("twin");
        let a = repo.save(m.clone()).unwrap();
        let b = repo.save(m).unwrap();
        repo.save(Member::new("other")).unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(repo.find_all().unwrap().len(), 3);
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
        assert!(err.to_string().contains("no generated key"));
        assert!(repo.find_all().unwrap().is_empty());
    }

    #[test]
    fn shares_rows_with_direct_repository() {
        let (repo, ds, _dir) = tmp_repo();
        let direct = SqliteMemberRepository::new(Arc::clone(&ds));
        let saved = direct.save(Member::new("both")).unwrap();

        let seen = repo.find_by_name("both").unwrap().unwrap();
        assert_eq!(seen, saved);
    }

    #[test]
    fn service_rejects_duplicate() {
        let (repo, _ds, _dir) = tmp_repo();
        let svc = MemberService::new(repo);
        svc.join(Member::new("test")).unwrap();
        let err = svc.join(Member::new("test")).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateMember));
        assert_eq!(svc.find_members().unwrap().len(), 1);
    }

    #[test]
    fn simple_insert_requires_table_and_key_column() {
        let ds = Arc::new(DataSource::open_in_memory().unwrap());
        let template = SqlTemplate::new(ds);
        let name: &dyn ToSql = &"x";

        let err = SimpleInsert::new(&template)
            .using_generated_key_column("id")
            .execute_and_return_key(&[("name", name)])
            .unwrap_err();
        assert!(matches!(err, DataAccessError::InvalidUsage(_)));

        let err = SimpleInsert::new(&template)
            .with_table_name("member")
            .execute_and_return_key(&[("name", name)])
            .unwrap_err();
        assert!(matches!(err, DataAccessError::InvalidUsage(_)));
    }

    #[test]
    fn simple_insert_rejects_odd_identifiers() {
        let ds = Arc::new(DataSource::open_in_memory().unwrap());
        let template = SqlTemplate::new(ds);
        let name: &dyn ToSql = &"x";

        let err = SimpleInsert::new(&template)
            .with_table_name("member; DROP TABLE member")
            .using_generated_key_column("id")
            .execute_and_return_key(&[("name", name)])
            .unwrap_err();
        assert!(matches!(err, DataAccessError::InvalidUsage(_)));
    }

    #[test]
    fn template_update_and_query_on_custom_table() {
        let ds = Arc::new(DataSource::open_in_memory().unwrap());
        let template = SqlTemplate::new(ds);
        template
            .update("CREATE TABLE tag (id INTEGER PRIMARY KEY, label TEXT NOT NULL)", [])
            .unwrap();
        let label: &dyn ToSql = &"rust";
        let key = SimpleInsert::new(&template)
            .with_table_name("tag")
            .using_generated_key_column("id")
            .execute_and_return_key(&[("label", label)])
            .unwrap();
        assert_eq!(key, 1);

        let labels = template
            .query("SELECT label FROM tag", [], |row| row.get::<_, String>(0))
            .unwrap();
        assert_eq!(labels, vec!["rust".to_string()]);

        let affected = template
            .update("UPDATE tag SET label = ?1", params!["go"])
            .unwrap();
        assert_eq!(affected, 1);
    }

    #[test]
    fn simple_insert_returns_the_requested_key_column() {
        let ds = Arc::new(DataSource::open_in_memory().unwrap());
        let template = SqlTemplate::new(ds);
        template
            .update("CREATE TABLE ticket (label TEXT, code INTEGER DEFAULT 4242)", [])
            .unwrap();
        let label: &dyn ToSql = &"first";

        let key = SimpleInsert::new(&template)
            .with_table_name("ticket")
            .using_generated_key_column("code")
            .execute_and_return_key(&[("label", label)])
            .unwrap();
        assert_eq!(key, 4242);

        let err = SimpleInsert::new(&template)
            .with_table_name("ticket")
            .using_generated_key_column("no_such_column")
            .execute_and_return_key(&[("label", label)])
            .unwrap_err();
        assert!(matches!(err, DataAccessError::Sql(_)));
        // the failed insert wrote nothing
        let count = template
            .query("SELECT label FROM ticket", [], |row| row.get::<_, String>(0))
            .unwrap()
            .len();
        assert_eq!(count, 1);
    }

    #[test]
    fn query_first_stops_before_later_rows() {
        let (_repo, ds, _dir) = tmp_repo();
        // the second row carries an id the mapper rejects
        ds.connection()
            .unwrap()
            .execute_batch("INSERT INTO member(id, name) VALUES (1, 'a'), (-5, 'b');")
            .unwrap();
        let template = SqlTemplate::new(ds);

        let first = template
            .query_first("SELECT id, name FROM member ORDER BY name", [], member_row_mapper)
            .unwrap()
            .unwrap();
        assert_eq!(first.name, "a");
        assert!(template
            .query("SELECT id, name FROM member ORDER BY name", [], member_row_mapper)
            .is_err());
    }
}
