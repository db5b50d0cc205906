use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid database connection string: {0}")]
    ConnectionConfigError(String),

    #[error("Database query failed: {0}")]
    QueryError(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    /// A referenced program or client does not exist.
    #[error("{0}")]
    NotFound(&'static str),

    /// The write would break a uniqueness or enrollment rule.
    #[error("{0}")]
    Conflict(&'static str),
}

impl DbError {
    /// Turns a unique-constraint violation into a `Conflict` carrying `message`.
    pub(crate) fn on_unique_violation(err: sqlx::Error, message: &'static str) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(message)
            }
            _ => DbError::QueryError(err),
        }
    }
}
