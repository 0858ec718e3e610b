use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::billing::SettlePaymentRequest;
use crate::error::EngineError;
use crate::handlers::Workflow;
use crate::models::*;
use crate::orders::OrderItemsRequest;
use crate::reservations::BookReservationRequest;
use crate::ActorContext;

pub const ACTOR_HEADER: &str = "x-actor-id";
pub const RESTAURANT_HEADER: &str = "x-restaurant-id";

#[derive(Clone)]
pub struct AppState {
    pub workflow: Workflow,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignTableRequest {
    pub table_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct AssignTableResponse {
    pub reservation: Reservation,
    pub table: RestaurantTable,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/reservations", post(book_reservation))
        .route(
            "/reservations/:id",
            get(get_reservation).delete(remove_reservation),
        )
        .route("/reservations/:id/cancel", post(cancel_reservation))
        .route("/reservations/:id/table", post(assign_table))
        .route("/reservations/:id/orders", post(create_order))
        .route("/orders/:id", get(get_order).patch(update_order))
        .route("/orders/:id/finalize", post(finalize_order))
        .route("/orders/:id/bill", post(generate_bill))
        .route("/bills/:id", get(get_bill))
        .route("/bills/:id/payment", post(settle_payment))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub fn error_response(err: EngineError) -> ApiError {
    let status = match &err {
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Conflict(_) => StatusCode::CONFLICT,
        EngineError::Database(_) | EngineError::Pool(_) => {
            tracing::error!("Workflow infrastructure failure: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

fn header_uuid(headers: &HeaderMap, name: &str) -> Result<Uuid, ApiError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: format!("missing or malformed {} header", name),
                }),
            )
        })
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ActorContext {
            actor_id: header_uuid(&parts.headers, ACTOR_HEADER)?,
            restaurant_id: header_uuid(&parts.headers, RESTAURANT_HEADER)?,
        })
    }
}

pub async fn book_reservation(
    State(state): State<AppState>,
    actor: ActorContext,
    Json(request): Json<BookReservationRequest>,
) -> Result<(StatusCode, Json<Reservation>), ApiError> {
    let reservation = state
        .workflow
        .book_reservation(request, &actor)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

pub async fn get_reservation(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<Reservation>, ApiError> {
    state
        .workflow
        .get_reservation(reservation_id, &actor)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn remove_reservation(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(reservation_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .workflow
        .remove_reservation(reservation_id, &actor)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn cancel_reservation(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<Reservation>, ApiError> {
    state
        .workflow
        .cancel_reservation(reservation_id, &actor)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn assign_table(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(reservation_id): Path<Uuid>,
    Json(request): Json<AssignTableRequest>,
) -> Result<Json<AssignTableResponse>, ApiError> {
    let (reservation, table) = state
        .workflow
        .assign_table(reservation_id, request.table_id, &actor)
        .await
        .map_err(error_response)?;
    Ok(Json(AssignTableResponse { reservation, table }))
}

pub async fn create_order(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(reservation_id): Path<Uuid>,
    Json(request): Json<OrderItemsRequest>,
) -> Result<(StatusCode, Json<OrderWithItems>), ApiError> {
    let order = state
        .workflow
        .create_order(reservation_id, request, &actor)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn get_order(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderWithItems>, ApiError> {
    state
        .workflow
        .get_order(order_id, &actor)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn update_order(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(order_id): Path<Uuid>,
    Json(request): Json<OrderItemsRequest>,
) -> Result<Json<OrderWithItems>, ApiError> {
    state
        .workflow
        .update_order(order_id, request, &actor)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn finalize_order(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, ApiError> {
    state
        .workflow
        .finalize_order(order_id, &actor)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn generate_bill(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(order_id): Path<Uuid>,
) -> Result<(StatusCode, Json<BillWithItems>), ApiError> {
    let bill = state
        .workflow
        .generate_bill(order_id, &actor)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(bill)))
}

pub async fn get_bill(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(bill_id): Path<Uuid>,
) -> Result<Json<BillWithItems>, ApiError> {
    state
        .workflow
        .get_bill(bill_id, &actor)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn settle_payment(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(bill_id): Path<Uuid>,
    Json(request): Json<SettlePaymentRequest>,
) -> Result<Json<Settlement>, ApiError> {
    state
        .workflow
        .settle_payment(bill_id, request, &actor)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn health_check() -> &'static str {
    "OK"
}
