use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A named health initiative that clients can be enrolled in.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Program {
    pub id: i64,
    pub name: String,
}

/// A row from the `clients` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub age: i32,
    pub gender: String,
    pub contact: String,
}

/// A client together with every program it is enrolled in.
///
/// This is the shape returned by all client endpoints. On the wire the
/// client's own fields sit at the top level next to `programs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientWithPrograms {
    #[serde(flatten)]
    pub client: Client,
    #[serde(default)]
    pub programs: Vec<Program>,
}

impl ClientWithPrograms {
    /// Wraps a client that has no enrollments yet.
    pub fn unenrolled(client: Client) -> Self {
        Self {
            client,
            programs: Vec::new(),
        }
    }
}

/// Body for simple acknowledgement responses, e.g. after a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn john() -> Client {
        Client {
            id: 1,
            name: "John Doe".to_string(),
            age: 30,
            gender: "male".to_string(),
            contact: "1234567890".to_string(),
        }
    }

    #[test]
    fn client_with_programs_serializes_flat() {
        let client = ClientWithPrograms {
            client: john(),
            programs: vec![Program {
                id: 1,
                name: "TB".to_string(),
            }],
        };

        let value = serde_json::to_value(&client).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 1,
                "name": "John Doe",
                "age": 30,
                "gender": "male",
                "contact": "1234567890",
                "programs": [{ "id": 1, "name": "TB" }]
            })
        );
    }

    #[test]
    fn missing_programs_deserialize_as_empty() {
        let value = json!({
            "id": 1,
            "name": "John Doe",
            "age": 30,
            "gender": "male",
            "contact": "1234567890"
        });
        let client: ClientWithPrograms = serde_json::from_value(value).unwrap();
        assert_eq!(client, ClientWithPrograms::unenrolled(john()));
    }
}
