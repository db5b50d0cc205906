use crate::{error::AppError, AppState};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use axum_extra::extract::WithRejection;
use core_types::{
    ClientFields, ClientSearch, ClientWithPrograms, EnrollmentRequest, MessageResponse,
    NewProgram, Pagination, Program,
};
use database::DbError;
use std::sync::Arc;

type JsonBody<T> = WithRejection<Json<T>, AppError>;
type IdPath = WithRejection<Path<i64>, AppError>;
type PageQuery = WithRejection<Query<Pagination>, AppError>;

// ==============================================================================
// Programs
// ==============================================================================

/// # POST /api/v1/programs/
pub async fn create_program(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(payload), _): JsonBody<NewProgram>,
) -> Result<Json<Program>, AppError> {
    if state.db_repo.get_program_by_name(&payload.name).await?.is_some() {
        return Err(DbError::Conflict("Program already exists").into());
    }
    let program = state.db_repo.create_program(&payload).await?;
    tracing::info!(program_id = program.id, "Program created.");
    Ok(Json(program))
}

/// # GET /api/v1/programs/?skip&limit
pub async fn list_programs(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(page), _): PageQuery,
) -> Result<Json<Vec<Program>>, AppError> {
    let programs = state.db_repo.list_programs(page).await?;
    Ok(Json(programs))
}

/// # PUT /api/v1/programs/:program_id
pub async fn update_program(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(program_id), _): IdPath,
    WithRejection(Json(payload), _): JsonBody<NewProgram>,
) -> Result<Json<Program>, AppError> {
    let program = state.db_repo.update_program(program_id, &payload).await?;
    Ok(Json(program))
}

/// # DELETE /api/v1/programs/:program_id
/// Refused with 400 while any client is enrolled in the program.
pub async fn delete_program(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(program_id), _): IdPath,
) -> Result<Json<MessageResponse>, AppError> {
    state.db_repo.delete_program(program_id).await?;
    tracing::info!(program_id, "Program deleted.");
    Ok(Json(MessageResponse::new("Program deleted successfully")))
}

// ==============================================================================
// Clients
// ==============================================================================

/// # POST /api/v1/clients/
pub async fn create_client(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(payload), _): JsonBody<ClientFields>,
) -> Result<Json<ClientWithPrograms>, AppError> {
    let client = state.db_repo.create_client(&payload).await?;
    tracing::info!(client_id = client.client.id, "Client registered.");
    Ok(Json(client))
}

/// # GET /api/v1/clients/?skip&limit
pub async fn list_clients(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(page), _): PageQuery,
) -> Result<Json<Vec<ClientWithPrograms>>, AppError> {
    let clients = state.db_repo.list_clients(page).await?;
    Ok(Json(clients))
}

/// # GET /api/v1/clients/:client_id
pub async fn get_client(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(client_id), _): IdPath,
) -> Result<Json<ClientWithPrograms>, AppError> {
    let client = state
        .db_repo
        .get_client(client_id)
        .await?
        .ok_or(DbError::NotFound("Client not found"))?;
    Ok(Json(client))
}

/// # PUT /api/v1/clients/:client_id
/// Overwrites every client field; enrollments are kept.
pub async fn update_client(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(client_id), _): IdPath,
    WithRejection(Json(payload), _): JsonBody<ClientFields>,
) -> Result<Json<ClientWithPrograms>, AppError> {
    let client = state.db_repo.update_client(client_id, &payload).await?;
    Ok(Json(client))
}

/// # DELETE /api/v1/clients/:client_id
/// Also removes every enrollment of the client.
pub async fn delete_client(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(client_id), _): IdPath,
) -> Result<Json<MessageResponse>, AppError> {
    state.db_repo.delete_client(client_id).await?;
    tracing::info!(client_id, "Client deleted.");
    Ok(Json(MessageResponse::new("Client deleted successfully")))
}

/// # POST /api/v1/clients/search/
pub async fn search_clients(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(search), _): JsonBody<ClientSearch>,
) -> Result<Json<Vec<ClientWithPrograms>>, AppError> {
    let clients = state.db_repo.search_clients(&search.query).await?;
    Ok(Json(clients))
}

// ==============================================================================
// Enrollments
// ==============================================================================

/// # POST /api/v1/enrollments/
pub async fn create_enrollment(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(enrollment), _): JsonBody<EnrollmentRequest>,
) -> Result<Json<ClientWithPrograms>, AppError> {
    let client = state.db_repo.enroll_client(&enrollment).await?;
    Ok(Json(client))
}

/// # DELETE /api/v1/enrollments/
/// Takes the same body as enrollment creation.
pub async fn delete_enrollment(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(enrollment), _): JsonBody<EnrollmentRequest>,
) -> Result<Json<ClientWithPrograms>, AppError> {
    let client = state.db_repo.unenroll_client(&enrollment).await?;
    Ok(Json(client))
}

// ==============================================================================
// Utility
// ==============================================================================

/// # GET /
pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse::new("Hello World"))
}

/// # GET /hello/:name
pub async fn say_hello(Path(name): Path<String>) -> Json<MessageResponse> {
    Json(MessageResponse::new(format!("Hello {name}")))
}
