use std::sync::Arc;

use axum::{
    Json,
    extract::{self, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};

use crate::{
    error::AppError,
    models::{Acknowledged, IdPayload, Listing, ResponseView, SubmitPayload},
    state::State,
    utils::{ClientIp, parse_id, validate_submission},
};

type Shared = extract::State<Arc<State>>;

pub async fn submit_handler(
    extract::State(state): Shared,
    ClientIp(ip): ClientIp,
    payload: Result<Json<SubmitPayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload.map_err(|_| AppError::MalformedPayload)?;
    let submission = validate_submission(payload)?;

    match ip.as_deref() {
        None => warn!("Could not determine client IP for submission"),
        Some(ip) => {
            // check-then-insert, not atomic across concurrent requests
            if state.store.find_by_ip(ip).await?.is_some() {
                info!("Rejected submission from an already recorded IP");
                return Err(AppError::DuplicateSubmission);
            }
        }
    }

    let id = state
        .store
        .insert(submission.into_document(Utc::now(), ip))
        .await?;

    info!("Stored response {id}");

    Ok((
        StatusCode::CREATED,
        Json(Acknowledged {
            success: true,
            id: id.to_hex(),
        }),
    ))
}

pub async fn records_handler(
    extract::State(state): Shared,
) -> Result<Json<Listing<Vec<ResponseView>>>, AppError> {
    let data = state
        .store
        .list_newest_first()
        .await?
        .into_iter()
        .map(ResponseView::from)
        .collect();

    Ok(Json(Listing {
        success: true,
        data,
    }))
}

pub async fn delete_record_handler(
    extract::State(state): Shared,
    payload: Result<Json<IdPayload>, JsonRejection>,
) -> Result<Json<Acknowledged>, AppError> {
    let Json(payload) = payload.map_err(|_| AppError::MalformedPayload)?;
    let id = parse_id(payload)?;

    if state.store.delete_by_id(id).await? == 0 {
        return Err(AppError::NotFound);
    }

    info!("Deleted response {id}");

    Ok(Json(Acknowledged {
        success: true,
        id: id.to_hex(),
    }))
}

pub async fn reset_ip_handler(
    extract::State(state): Shared,
    payload: Result<Json<IdPayload>, JsonRejection>,
) -> Result<Json<Acknowledged>, AppError> {
    let Json(payload) = payload.map_err(|_| AppError::MalformedPayload)?;
    let id = parse_id(payload)?;

    if state.store.clear_ip(id).await? == 0 {
        return Err(AppError::NotFound);
    }

    info!("Cleared ip on response {id}");

    Ok(Json(Acknowledged {
        success: true,
        id: id.to_hex(),
    }))
}

pub async fn summary_handler(extract::State(state): Shared) -> Result<impl IntoResponse, AppError> {
    let data = state.store.summary().await?;

    Ok(Json(Listing {
        success: true,
        data,
    }))
}

pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
