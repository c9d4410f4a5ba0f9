pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /upscale              submit upscale job (POST, multipart, rate limited)
/// /face-enhance         submit face restoration job (POST, multipart, rate limited)
/// /result/{job_id}      poll job status (GET)
/// /jobs/active          list queued/processing jobs (GET, ?lane= filter)
/// ```
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new().merge(jobs::router(state))
}
