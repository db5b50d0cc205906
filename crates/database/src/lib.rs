//! # Health System Database Crate
//!
//! This crate is the data-access layer for health programs, clients and the
//! enrollments that link them. It encapsulates all SQL so the rest of the
//! application only sees typed operations.
//!
//! ## Architectural Principles
//!
//! - **Explicit Handle:** There is no global engine or session. Callers build a
//!   pool with `connect`, wrap it in a `DbRepository`, and pass that down.
//! - **Scoped Connections:** Every repository method borrows one pooled
//!   connection (or one transaction) and returns it when the call completes,
//!   whether it succeeded or failed.
//! - **Explicit Junction Table:** Enrollments are inserted and deleted by their
//!   composite key, and nested `programs` lists are built from a join query.
//!
//! ## Public API
//!
//! - `connect`: Builds the SQLite connection pool.
//! - `run_migrations`: Creates the schema if it is missing.
//! - `DbRepository`: All create/read/update/delete/search operations.
//! - `DbError`: `NotFound` and `Conflict` for rule violations, plus driver errors.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod repository;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use repository::DbRepository;
