use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::error::AppError;
use crate::models::queue::QueueSnapshot;
use crate::models::DataResponse;
use crate::state::AppState;

pub const ADMIN_PASSPHRASE_HEADER: &str = "x-admin-passphrase";

/// Read-only view of the queue for dashboards. Requires the admin passphrase
/// header when one is configured.
pub async fn get_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DataResponse<QueueSnapshot>>, AppError> {
    if let Some(expected) = &state.admin_passphrase {
        let supplied = headers
            .get(ADMIN_PASSPHRASE_HEADER)
            .and_then(|v| v.to_str().ok());
        if !supplied.is_some_and(|p| expected.verify(p)) {
            tracing::warn!("queue snapshot request rejected: bad passphrase");
            return Err(AppError::Unauthorized(
                "admin passphrase required".to_string(),
            ));
        }
    }

    let snapshot = state
        .arbiter
        .snapshot()
        .await
        .ok_or_else(|| AppError::Unavailable("arbiter is not running".to_string()))?;
    Ok(Json(DataResponse::new(snapshot)))
}
