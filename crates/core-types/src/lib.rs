pub mod requests;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use requests::{ClientFields, ClientSearch, EnrollmentRequest, NewProgram, Pagination};
pub use structs::{Client, ClientWithPrograms, MessageResponse, Program};
