//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use helpdesk_core::{
    StoreError, Ticket, TicketFilter, TicketMessage, TicketPriority, TicketStatus, TicketUpdate,
};

use crate::AppState;

type ApiError = (StatusCode, String);

/// Map a store failure onto a status code.
fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        StoreError::AlreadyExists(msg) => (StatusCode::CONFLICT, msg),
        StoreError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        other => {
            tracing::error!(error = %other, "document store failure");
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

fn ticket_not_found(id: &str) -> ApiError {
    (StatusCode::NOT_FOUND, format!("Ticket {} not found", id))
}

/// Liveness probe
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Create a ticket
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Ticket>, JsonRejection>,
) -> Result<(StatusCode, Json<Ticket>), ApiError> {
    let Json(ticket) = body.map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?;
    state.documents.insert_ticket(&ticket).map_err(store_error)?;
    tracing::info!(ticket_id = %ticket.uuid, "ticket created");
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// List tickets matching optional `customer_id`, `agent_id`, `status` and
/// `priority` query parameters
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<TicketFilter>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    state
        .documents
        .find_tickets(&filter)
        .map(Json)
        .map_err(store_error)
}

/// Get a specific ticket
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    state
        .documents
        .get_ticket(&id)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| ticket_not_found(&id))
}

/// Apply a partial status/priority update
pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<TicketUpdate>, JsonRejection>,
) -> Result<Json<Ticket>, ApiError> {
    let Json(update) = body.map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?;
    if update.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "No valid fields to update".to_string(),
        ));
    }
    state
        .documents
        .update_ticket(&id, &update)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| ticket_not_found(&id))
}

/// Delete a ticket
pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.documents.delete_ticket(&id).map_err(store_error)? {
        Ok(Json(serde_json::json!({ "message": "Ticket deleted" })))
    } else {
        Err(ticket_not_found(&id))
    }
}

/// Tickets filed by a customer
pub async fn tickets_by_customer(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<String>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    let filter = TicketFilter {
        customer_id: Some(customer_id),
        ..Default::default()
    };
    list_tickets(State(state), Query(filter)).await
}

/// Optional agent restriction for the status and priority listings
#[derive(Debug, Default, Deserialize)]
pub struct AgentQuery {
    pub agent_id: Option<String>,
}

/// Tickets in a status, optionally restricted to one agent
pub async fn tickets_by_status(
    State(state): State<Arc<AppState>>,
    Path(status): Path<String>,
    Query(query): Query<AgentQuery>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    let status: TicketStatus = status
        .parse()
        .map_err(|e: helpdesk_core::ticket::ParseVocabularyError| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let filter = TicketFilter {
        agent_id: query.agent_id,
        status: Some(status),
        ..Default::default()
    };
    list_tickets(State(state), Query(filter)).await
}

/// Tickets at a priority, optionally restricted to one agent
pub async fn tickets_by_priority(
    State(state): State<Arc<AppState>>,
    Path(priority): Path<String>,
    Query(query): Query<AgentQuery>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    let priority: TicketPriority = priority
        .parse()
        .map_err(|e: helpdesk_core::ticket::ParseVocabularyError| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let filter = TicketFilter {
        agent_id: query.agent_id,
        priority: Some(priority),
        ..Default::default()
    };
    list_tickets(State(state), Query(filter)).await
}

/// Sender of a new message
#[derive(Debug, Deserialize)]
pub struct CustomerQuery {
    pub customer_id: String,
}

/// Request to add a message
#[derive(Debug, Deserialize)]
pub struct NewMessageRequest {
    pub text: String,
}

/// Response for an added message
#[derive(Debug, Serialize)]
pub struct MessageAdded {
    pub message: String,
    pub new_message: TicketMessage,
}

/// Append a message to a ticket
pub async fn add_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<CustomerQuery>,
    body: Result<Json<NewMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageAdded>), ApiError> {
    let Json(request) = body.map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?;
    if request.text.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message text is empty".to_string()));
    }
    let new_message = state
        .documents
        .append_message(&id, &query.customer_id, &request.text)
        .map_err(store_error)?
        .ok_or_else(|| ticket_not_found(&id))?;
    Ok((
        StatusCode::CREATED,
        Json(MessageAdded {
            message: "Message added".to_string(),
            new_message,
        }),
    ))
}
