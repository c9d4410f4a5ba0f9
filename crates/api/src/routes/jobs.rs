use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::ratelimit;
use crate::state::AppState;

/// Mount the job submission and polling routes.
///
/// The body-size cap and the rate counter apply to the submission
/// endpoints only; polling stays cheap and unmetered.
pub fn router(state: AppState) -> Router<AppState> {
    let submissions = Router::new()
        .route("/upscale", post(jobs::submit_upscale))
        .route("/face-enhance", post(jobs::submit_face_enhance))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(middleware::from_fn_with_state(state, ratelimit::enforce));

    Router::new()
        .merge(submissions)
        .route("/result/{job_id}", get(jobs::get_result))
        .route("/jobs/active", get(jobs::list_active))
}
