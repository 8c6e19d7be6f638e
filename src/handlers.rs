use crate::admin;
use crate::booking::{self, BookSlot};
use crate::consts::SLOT_CAPACITY;
use crate::error::{HandlerError, ValidationError};
use crate::ledger;
use crate::profile;
use crate::types::{
    AppState, BookPayload, Profile, RebookPayload, RecordingLink, RequestListing, Session,
};
use crate::utils::{b64_decode, recording_object_name};
use crate::validation;

use axum::async_trait;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use tracing::debug;

use crate::blobstore::BlobStore;

const SESSION_HEADER: &str = "x-hwn-phone";
const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Pull the caller's identity out of the session header.  Everything behind
/// this extractor works with an explicit `Session`, never a global.
#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ValidationError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let phone = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ValidationError::new("missing x-hwn-phone header"))?;
        validation::check_phone(phone)?;
        Ok(Session {
            phone: phone.to_string(),
        })
    }
}

fn require_admin(headers: &HeaderMap, app_state: &AppState) -> Result<(), HandlerError> {
    let token = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if token.is_empty() || token != app_state.admin_token {
        return Err(HandlerError::Unauthorized);
    }
    Ok(())
}

fn decode_audio(audio_b64: Option<String>) -> Result<Option<Vec<u8>>, ValidationError> {
    match audio_b64 {
        None => Ok(None),
        Some(enc) => {
            let bytes = b64_decode(&enc)?;
            validation::check_recording_size(&bytes)?;
            Ok(Some(bytes))
        }
    }
}

pub async fn available_slots_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, HandlerError> {
    let counts = ledger::read_counts(&app_state.store).await?;
    Ok(Json(ledger::available_slots(&counts, SLOT_CAPACITY)))
}

pub async fn list_requests_handler(
    session: Session,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<RequestListing>, HandlerError> {
    let listing = booking::list_requests(&app_state.store, &session).await?;
    Ok(Json(listing))
}

pub async fn book_handler(
    session: Session,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<BookPayload>,
) -> Result<StatusCode, HandlerError> {
    validation::check_slot(&payload.slot)?;
    validation::check_remarks(&payload.remarks)?;
    let audio = decode_audio(payload.audio_b64)?;
    booking::book_slot(
        &app_state.store,
        &app_state.blobs,
        &session,
        BookSlot {
            slot: payload.slot,
            remarks: payload.remarks,
            audio,
        },
    )
    .await?;
    Ok(StatusCode::CREATED)
}

pub async fn rebook_handler(
    session: Session,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<RebookPayload>,
) -> Result<StatusCode, HandlerError> {
    validation::check_slot(&payload.new_slot)?;
    let audio = decode_audio(payload.audio_b64)?;
    booking::rebook_from_history(
        &app_state.store,
        &app_state.blobs,
        &session,
        &payload.history_slot,
        payload.new_slot,
        audio,
    )
    .await?;
    Ok(StatusCode::CREATED)
}

pub async fn cancel_handler(
    session: Session,
    State(app_state): State<Arc<AppState>>,
    Path(slot): Path<String>,
) -> Result<StatusCode, HandlerError> {
    validation::check_slot(&slot)?;
    booking::cancel_request(&app_state.store, &app_state.blobs, &session, &slot).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn recording_handler(
    session: Session,
    State(app_state): State<Arc<AppState>>,
    Path(slot): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    validation::check_slot(&slot)?;
    let object = recording_object_name(&session.phone, &slot);
    match app_state.blobs.resolve(&object).await? {
        Some(url) => Ok(Json(RecordingLink { url }).into_response()),
        None => {
            debug!(phone=%session.phone, slot, "no recording for slot");
            Ok((StatusCode::NOT_FOUND, "no recording for this slot").into_response())
        }
    }
}

pub async fn get_profile_handler(
    session: Session,
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HandlerError> {
    match profile::get_profile(&app_state.store, &session).await? {
        Some(stored) => Ok(Json(stored).into_response()),
        None => Ok((StatusCode::NOT_FOUND, "no profile yet").into_response()),
    }
}

pub async fn put_profile_handler(
    session: Session,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<Profile>,
) -> Result<StatusCode, HandlerError> {
    profile::save_profile(&app_state.store, &session, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn admin_export_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HandlerError> {
    require_admin(&headers, &app_state)?;
    let workbook = admin::export_workbook(&app_state.store, &app_state.blobs).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CONTENT_TYPE, "application/vnd.ms-excel".parse().unwrap());
    response_headers.insert(
        header::CONTENT_DISPOSITION,
        "attachment; filename=\"hwn_requests.xml\"".parse().unwrap(),
    );
    Ok((response_headers, workbook))
}

pub async fn admin_import_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<impl IntoResponse, HandlerError> {
    require_admin(&headers, &app_state)?;
    let outcome = admin::import_workbook(&app_state.store, &body).await?;
    Ok(Json(outcome))
}
