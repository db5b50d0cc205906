use crate::DbError;
use core_types::{
    Client, ClientFields, ClientWithPrograms, EnrollmentRequest, NewProgram, Pagination, Program,
};
use sqlx::sqlite::{Sqlite, SqliteConnection, SqlitePool};
use sqlx::{FromRow, QueryBuilder};
use std::collections::HashMap;

const PROGRAM_NOT_FOUND: &str = "Program not found";
const CLIENT_NOT_FOUND: &str = "Client not found";
const PROGRAM_EXISTS: &str = "Program already exists";
const PROGRAM_HAS_CLIENTS: &str = "Cannot delete program with enrolled clients";
const ALREADY_ENROLLED: &str = "Client already enrolled in this program";
const NOT_ENROLLED: &str = "Client is not enrolled in this program";

/// Client ids bound per program lookup.
const PROGRAM_LOOKUP_CHUNK: usize = 500;

/// The `DbRepository` provides a high-level, application-specific interface
/// to the database. It encapsulates all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: SqlitePool,
}

/// One row of the enrollment/programs join, tagged with the owning client.
#[derive(FromRow)]
struct EnrolledProgram {
    client_id: i64,
    id: i64,
    name: String,
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Closes every pooled connection. Called once at shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // --- Programs ---

    /// Inserts a new program.
    ///
    /// Callers are expected to check `get_program_by_name` first; a name that
    /// slips past that check still surfaces as `DbError::Conflict`.
    pub async fn create_program(&self, program: &NewProgram) -> Result<Program, DbError> {
        let created = sqlx::query_as::<_, Program>(
            "INSERT INTO programs (name) VALUES (?) RETURNING id, name",
        )
        .bind(&program.name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::on_unique_violation(e, PROGRAM_EXISTS))?;

        tracing::debug!(program_id = created.id, name = %created.name, "Created program.");
        Ok(created)
    }

    pub async fn get_program(&self, program_id: i64) -> Result<Option<Program>, DbError> {
        let mut conn = self.pool.acquire().await?;
        fetch_program(&mut conn, program_id).await
    }

    pub async fn get_program_by_name(&self, name: &str) -> Result<Option<Program>, DbError> {
        let program =
            sqlx::query_as::<_, Program>("SELECT id, name FROM programs WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(program)
    }

    /// Fetches one page of programs, ordered by id.
    pub async fn list_programs(&self, page: Pagination) -> Result<Vec<Program>, DbError> {
        let programs = sqlx::query_as::<_, Program>(
            "SELECT id, name FROM programs ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(i64::from(page.limit))
        .bind(i64::from(page.skip))
        .fetch_all(&self.pool)
        .await?;
        Ok(programs)
    }

    /// Overwrites every field of an existing program.
    pub async fn update_program(
        &self,
        program_id: i64,
        update: &NewProgram,
    ) -> Result<Program, DbError> {
        let updated = sqlx::query_as::<_, Program>(
            "UPDATE programs SET name = ? WHERE id = ? RETURNING id, name",
        )
        .bind(&update.name)
        .bind(program_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DbError::on_unique_violation(e, PROGRAM_EXISTS))?
        .ok_or(DbError::NotFound(PROGRAM_NOT_FOUND))?;

        tracing::debug!(program_id, name = %updated.name, "Updated program.");
        Ok(updated)
    }

    /// Deletes a program, refusing while any client is still enrolled in it.
    pub async fn delete_program(&self, program_id: i64) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        if fetch_program(&mut tx, program_id).await?.is_none() {
            return Err(DbError::NotFound(PROGRAM_NOT_FOUND));
        }

        let enrolled: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM enrollment WHERE program_id = ?")
                .bind(program_id)
                .fetch_one(&mut *tx)
                .await?;
        if enrolled > 0 {
            return Err(DbError::Conflict(PROGRAM_HAS_CLIENTS));
        }

        sqlx::query("DELETE FROM programs WHERE id = ?")
            .bind(program_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::debug!(program_id, "Deleted program.");
        Ok(())
    }

    // --- Clients ---

    pub async fn create_client(&self, fields: &ClientFields) -> Result<ClientWithPrograms, DbError> {
        let client = sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO clients (name, age, gender, contact)
            VALUES (?, ?, ?, ?)
            RETURNING id, name, age, gender, contact
            "#,
        )
        .bind(&fields.name)
        .bind(fields.age)
        .bind(&fields.gender)
        .bind(&fields.contact)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(client_id = client.id, "Created client.");
        Ok(ClientWithPrograms::unenrolled(client))
    }

    pub async fn get_client(&self, client_id: i64) -> Result<Option<ClientWithPrograms>, DbError> {
        let mut conn = self.pool.acquire().await?;
        match fetch_client(&mut conn, client_id).await? {
            Some(client) => Ok(Some(with_programs(&mut conn, client).await?)),
            None => Ok(None),
        }
    }

    /// Fetches one page of clients, ordered by id, each with its programs.
    pub async fn list_clients(&self, page: Pagination) -> Result<Vec<ClientWithPrograms>, DbError> {
        let mut conn = self.pool.acquire().await?;
        let clients = sqlx::query_as::<_, Client>(
            "SELECT id, name, age, gender, contact FROM clients ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(i64::from(page.limit))
        .bind(i64::from(page.skip))
        .fetch_all(&mut *conn)
        .await?;

        attach_programs(&mut conn, clients).await
    }

    /// Finds clients whose name contains `query`, ignoring ASCII case.
    ///
    /// `%` and `_` in the query are matched literally.
    pub async fn search_clients(&self, query: &str) -> Result<Vec<ClientWithPrograms>, DbError> {
        let mut conn = self.pool.acquire().await?;
        let clients = sqlx::query_as::<_, Client>(
            r#"
            SELECT id, name, age, gender, contact
            FROM clients
            WHERE name LIKE ? ESCAPE '\'
            ORDER BY id
            "#,
        )
        .bind(contains_pattern(query))
        .fetch_all(&mut *conn)
        .await?;

        attach_programs(&mut conn, clients).await
    }

    /// Overwrites every field of an existing client. Enrollments are untouched.
    pub async fn update_client(
        &self,
        client_id: i64,
        fields: &ClientFields,
    ) -> Result<ClientWithPrograms, DbError> {
        let mut conn = self.pool.acquire().await?;
        let client = sqlx::query_as::<_, Client>(
            r#"
            UPDATE clients
            SET name = ?, age = ?, gender = ?, contact = ?
            WHERE id = ?
            RETURNING id, name, age, gender, contact
            "#,
        )
        .bind(&fields.name)
        .bind(fields.age)
        .bind(&fields.gender)
        .bind(&fields.contact)
        .bind(client_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(DbError::NotFound(CLIENT_NOT_FOUND))?;

        tracing::debug!(client_id, "Updated client.");
        with_programs(&mut conn, client).await
    }

    /// Deletes a client together with all of its enrollment rows.
    pub async fn delete_client(&self, client_id: i64) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        if fetch_client(&mut tx, client_id).await?.is_none() {
            return Err(DbError::NotFound(CLIENT_NOT_FOUND));
        }

        let removed = sqlx::query("DELETE FROM enrollment WHERE client_id = ?")
            .bind(client_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(client_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::debug!(client_id, enrollments_removed = removed, "Deleted client.");
        Ok(())
    }

    // --- Enrollments ---

    /// Enrolls a client in a program and returns the client's updated view.
    pub async fn enroll_client(
        &self,
        enrollment: &EnrollmentRequest,
    ) -> Result<ClientWithPrograms, DbError> {
        let mut tx = self.pool.begin().await?;
        let client = require_pair(&mut tx, enrollment).await?;

        if is_enrolled(&mut tx, enrollment).await? {
            return Err(DbError::Conflict(ALREADY_ENROLLED));
        }

        sqlx::query("INSERT INTO enrollment (client_id, program_id) VALUES (?, ?)")
            .bind(enrollment.client_id)
            .bind(enrollment.program_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::on_unique_violation(e, ALREADY_ENROLLED))?;

        let updated = with_programs(&mut tx, client).await?;
        tx.commit().await?;

        tracing::debug!(
            client_id = enrollment.client_id,
            program_id = enrollment.program_id,
            "Enrolled client."
        );
        Ok(updated)
    }

    /// Removes a client from a program. Fails if the client was not enrolled.
    pub async fn unenroll_client(
        &self,
        enrollment: &EnrollmentRequest,
    ) -> Result<ClientWithPrograms, DbError> {
        let mut tx = self.pool.begin().await?;
        let client = require_pair(&mut tx, enrollment).await?;

        let removed = sqlx::query("DELETE FROM enrollment WHERE client_id = ? AND program_id = ?")
            .bind(enrollment.client_id)
            .bind(enrollment.program_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(DbError::Conflict(NOT_ENROLLED));
        }

        let updated = with_programs(&mut tx, client).await?;
        tx.commit().await?;

        tracing::debug!(
            client_id = enrollment.client_id,
            program_id = enrollment.program_id,
            "Unenrolled client."
        );
        Ok(updated)
    }
}

async fn fetch_program(
    conn: &mut SqliteConnection,
    program_id: i64,
) -> Result<Option<Program>, DbError> {
    let program = sqlx::query_as::<_, Program>("SELECT id, name FROM programs WHERE id = ?")
        .bind(program_id)
        .fetch_optional(conn)
        .await?;
    Ok(program)
}

async fn fetch_client(conn: &mut SqliteConnection, client_id: i64) -> Result<Option<Client>, DbError> {
    let client = sqlx::query_as::<_, Client>(
        "SELECT id, name, age, gender, contact FROM clients WHERE id = ?",
    )
    .bind(client_id)
    .fetch_optional(conn)
    .await?;
    Ok(client)
}

/// Loads both sides of an enrollment, client first, failing with `NotFound`
/// for whichever is missing.
async fn require_pair(
    conn: &mut SqliteConnection,
    enrollment: &EnrollmentRequest,
) -> Result<Client, DbError> {
    let client = fetch_client(conn, enrollment.client_id)
        .await?
        .ok_or(DbError::NotFound(CLIENT_NOT_FOUND))?;
    if fetch_program(conn, enrollment.program_id).await?.is_none() {
        return Err(DbError::NotFound(PROGRAM_NOT_FOUND));
    }
    Ok(client)
}

async fn is_enrolled(
    conn: &mut SqliteConnection,
    enrollment: &EnrollmentRequest,
) -> Result<bool, DbError> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM enrollment WHERE client_id = ? AND program_id = ?",
    )
    .bind(enrollment.client_id)
    .bind(enrollment.program_id)
    .fetch_optional(conn)
    .await?;
    Ok(found.is_some())
}

async fn with_programs(
    conn: &mut SqliteConnection,
    client: Client,
) -> Result<ClientWithPrograms, DbError> {
    let mut loaded = attach_programs(conn, vec![client]).await?;
    // attach_programs yields exactly one entry per input client.
    Ok(loaded.remove(0))
}

/// Resolves the `programs` list for a batch of clients with a join over the
/// enrollment table, one query per `PROGRAM_LOOKUP_CHUNK` clients so the bind
/// count stays below SQLite's variable limit. Input order is preserved.
async fn attach_programs(
    conn: &mut SqliteConnection,
    clients: Vec<Client>,
) -> Result<Vec<ClientWithPrograms>, DbError> {
    let mut rows = Vec::new();
    for chunk in clients.chunks(PROGRAM_LOOKUP_CHUNK) {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT e.client_id, p.id, p.name \
             FROM enrollment AS e \
             JOIN programs AS p ON p.id = e.program_id \
             WHERE e.client_id IN (",
        );
        let mut ids = query.separated(", ");
        for client in chunk {
            ids.push_bind(client.id);
        }
        ids.push_unseparated(") ORDER BY e.client_id, p.id");

        rows.extend(
            query
                .build_query_as::<EnrolledProgram>()
                .fetch_all(&mut *conn)
                .await?,
        );
    }

    let mut by_client: HashMap<i64, Vec<Program>> = HashMap::new();
    for row in rows {
        by_client.entry(row.client_id).or_default().push(Program {
            id: row.id,
            name: row.name,
        });
    }

    Ok(clients
        .into_iter()
        .map(|client| {
            let programs = by_client.remove(&client.id).unwrap_or_default();
            ClientWithPrograms { client, programs }
        })
        .collect())
}

/// Builds a `LIKE` pattern matching `query` anywhere, escaping wildcards.
fn contains_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect, run_migrations};

    async fn repo() -> DbRepository {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        DbRepository::new(pool)
    }

    fn fields(name: &str) -> ClientFields {
        ClientFields {
            name: name.to_string(),
            age: 30,
            gender: "male".to_string(),
            contact: "1234567890".to_string(),
        }
    }

    fn program(name: &str) -> NewProgram {
        NewProgram {
            name: name.to_string(),
        }
    }

    fn pair(client_id: i64, program_id: i64) -> EnrollmentRequest {
        EnrollmentRequest {
            client_id,
            program_id,
        }
    }

    #[test]
    fn contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("oh"), "%oh%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(contains_pattern(r"a\b"), r"%a\\b%");
    }

    #[tokio::test]
    async fn create_then_lookup_by_name_returns_same_id() {
        let repo = repo().await;
        let created = repo.create_program(&program("TB")).await.unwrap();
        let found = repo.get_program_by_name("TB").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(repo.get_program(created.id).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn duplicate_program_name_is_a_conflict() {
        let repo = repo().await;
        repo.create_program(&program("HIV")).await.unwrap();
        let err = repo.create_program(&program("HIV")).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(PROGRAM_EXISTS)));
    }

    #[tokio::test]
    async fn list_programs_honours_skip_and_limit() {
        let repo = repo().await;
        for name in ["A", "B", "C", "D"] {
            repo.create_program(&program(name)).await.unwrap();
        }

        let page = repo
            .list_programs(Pagination { skip: 1, limit: 2 })
            .await
            .unwrap();
        let names: Vec<_> = page.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["B", "C"]);
    }

    #[tokio::test]
    async fn update_program_overwrites_name() {
        let repo = repo().await;
        let created = repo.create_program(&program("Malaria")).await.unwrap();
        let updated = repo
            .update_program(created.id, &program("Malaria Prevention"))
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "Malaria Prevention");

        let err = repo.update_program(999, &program("x")).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(PROGRAM_NOT_FOUND)));
    }

    #[tokio::test]
    async fn delete_program_blocked_while_clients_enrolled() {
        let repo = repo().await;
        let tb = repo.create_program(&program("TB")).await.unwrap();
        let client = repo.create_client(&fields("John Doe")).await.unwrap();
        repo.enroll_client(&pair(client.client.id, tb.id)).await.unwrap();

        let err = repo.delete_program(tb.id).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(PROGRAM_HAS_CLIENTS)));

        repo.unenroll_client(&pair(client.client.id, tb.id)).await.unwrap();
        repo.delete_program(tb.id).await.unwrap();
        assert!(repo.get_program(tb.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_missing_program_is_not_found() {
        let repo = repo().await;
        let err = repo.delete_program(42).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(PROGRAM_NOT_FOUND)));
    }

    #[tokio::test]
    async fn enrolling_twice_is_a_conflict() {
        let repo = repo().await;
        let tb = repo.create_program(&program("TB")).await.unwrap();
        let client = repo.create_client(&fields("John Doe")).await.unwrap();

        let enrolled = repo.enroll_client(&pair(client.client.id, tb.id)).await.unwrap();
        assert_eq!(enrolled.programs, vec![tb.clone()]);

        let err = repo
            .enroll_client(&pair(client.client.id, tb.id))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(ALREADY_ENROLLED)));
    }

    #[tokio::test]
    async fn enrolling_checks_client_before_program() {
        let repo = repo().await;
        let err = repo.enroll_client(&pair(7, 8)).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(CLIENT_NOT_FOUND)));

        let client = repo.create_client(&fields("Jane")).await.unwrap();
        let err = repo
            .enroll_client(&pair(client.client.id, 8))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(PROGRAM_NOT_FOUND)));
    }

    #[tokio::test]
    async fn unenrolling_when_not_enrolled_is_a_conflict() {
        let repo = repo().await;
        let tb = repo.create_program(&program("TB")).await.unwrap();
        let client = repo.create_client(&fields("John Doe")).await.unwrap();

        let err = repo
            .unenroll_client(&pair(client.client.id, tb.id))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(NOT_ENROLLED)));
    }

    #[tokio::test]
    async fn deleting_client_removes_its_enrollments() {
        let repo = repo().await;
        let tb = repo.create_program(&program("TB")).await.unwrap();
        let hiv = repo.create_program(&program("HIV")).await.unwrap();
        let client = repo.create_client(&fields("John Doe")).await.unwrap();
        let id = client.client.id;
        repo.enroll_client(&pair(id, tb.id)).await.unwrap();
        let both = repo.enroll_client(&pair(id, hiv.id)).await.unwrap();
        assert_eq!(both.programs, vec![tb.clone(), hiv.clone()]);

        repo.delete_client(id).await.unwrap();
        assert!(repo.get_client(id).await.unwrap().is_none());

        repo.delete_program(tb.id).await.unwrap();
        repo.delete_program(hiv.id).await.unwrap();

        let err = repo.delete_client(id).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(CLIENT_NOT_FOUND)));
    }

    #[tokio::test]
    async fn search_is_case_insensitive_substring() {
        let repo = repo().await;
        repo.create_client(&fields("John Doe")).await.unwrap();
        repo.create_client(&fields("Mary Achieng")).await.unwrap();
        repo.create_client(&fields("100% Fit")).await.unwrap();

        let hits = repo.search_clients("oh").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].client.name, "John Doe");

        let hits = repo.search_clients("JOHN").await.unwrap();
        assert_eq!(hits.len(), 1);

        let hits = repo.search_clients("%").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].client.name, "100% Fit");
    }

    #[tokio::test]
    async fn update_client_keeps_enrollments() {
        let repo = repo().await;
        let tb = repo.create_program(&program("TB")).await.unwrap();
        let client = repo.create_client(&fields("John Doe")).await.unwrap();
        let id = client.client.id;
        repo.enroll_client(&pair(id, tb.id)).await.unwrap();

        let updated = repo
            .update_client(
                id,
                &ClientFields {
                    name: "John D.".to_string(),
                    age: 31,
                    gender: "male".to_string(),
                    contact: "0700000000".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.client.name, "John D.");
        assert_eq!(updated.client.age, 31);
        assert_eq!(updated.client.contact, "0700000000");
        assert_eq!(updated.programs, vec![tb]);

        let err = repo.update_client(999, &fields("x")).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(CLIENT_NOT_FOUND)));
    }

    #[tokio::test]
    async fn list_clients_attaches_programs_per_client() {
        let repo = repo().await;
        let tb = repo.create_program(&program("TB")).await.unwrap();
        let a = repo.create_client(&fields("Alice")).await.unwrap();
        let b = repo.create_client(&fields("Bob")).await.unwrap();
        repo.enroll_client(&pair(b.client.id, tb.id)).await.unwrap();

        let clients = repo.list_clients(Pagination::default()).await.unwrap();
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].client.id, a.client.id);
        assert!(clients[0].programs.is_empty());
        assert_eq!(clients[1].programs, vec![tb]);
    }

    #[tokio::test]
    async fn search_over_more_clients_than_sqlite_bind_limit() {
        let repo = repo().await;
        let tb = repo.create_program(&program("TB")).await.unwrap();

        sqlx::query(
            r#"
            WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 33000)
            INSERT INTO clients (name, age, gender, contact)
            SELECT 'Client ' || n, 30, 'female', '0700000000' FROM seq
            "#,
        )
        .execute(&repo.pool)
        .await
        .unwrap();
        repo.enroll_client(&pair(32_999, tb.id)).await.unwrap();

        let hits = repo.search_clients("Client").await.unwrap();
        assert_eq!(hits.len(), 33_000);
        assert_eq!(hits[32_998].client.id, 32_999);
        assert_eq!(hits[32_998].programs, vec![tb]);
        assert!(hits[0].programs.is_empty());

        let page = repo
            .list_clients(Pagination {
                skip: 0,
                limit: 40_000,
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 33_000);
    }
}
