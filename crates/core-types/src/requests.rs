//! Inbound payloads. These are type-checked by `serde` at the HTTP boundary
//! and handed to the data-access layer as-is.

use serde::{Deserialize, Serialize};

/// Payload for creating or renaming a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProgram {
    pub name: String,
}

/// Every writable client field. Used for both create and full-overwrite update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFields {
    pub name: String,
    pub age: i32,
    pub gender: String,
    pub contact: String,
}

/// Identifies one (client, program) pair in the enrollment table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub client_id: i64,
    pub program_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSearch {
    pub query: String,
}

/// Offset/limit query parameters for list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_limit(),
        }
    }
}
