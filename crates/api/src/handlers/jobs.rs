//! Handlers for job submission and status polling.

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use pixelift_core::lane::Lane;
use pixelift_core::options::{JobOptions, SubmitOptions};
use pixelift_core::record::{JobResult, JobStatus};
use pixelift_core::types::JobId;
use pixelift_store::ActiveJob;
use serde::{Deserialize, Serialize};

use crate::dispatch::ImageInfo;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Typed response for the submission endpoints.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    /// `queued`, or `failed` when the record was created but the
    /// enqueue itself failed.
    pub status: JobStatus,
    pub image_info: ImageInfo,
    pub options: JobOptions,
}

/// Typed response for the result polling endpoint.
///
/// Exactly three fields: `status` always, `result` only when completed,
/// `error` only when failed.
#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /api/v1/upscale
///
/// Multipart `file` plus query options; 202 with the new job id.
pub async fn submit_upscale(
    State(state): State<AppState>,
    Query(options): Query<SubmitOptions>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<SubmitResponse>>)> {
    submit(state, Lane::Upscale, options, multipart).await
}

/// POST /api/v1/face-enhance
///
/// Same shape as upscale, plus the `only_center_face` query flag.
pub async fn submit_face_enhance(
    State(state): State<AppState>,
    Query(options): Query<SubmitOptions>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<SubmitResponse>>)> {
    submit(state, Lane::Face, options, multipart).await
}

async fn submit(
    state: AppState,
    lane: Lane,
    options: SubmitOptions,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<SubmitResponse>>)> {
    let mut upload: Option<(Vec<u8>, Option<String>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(map_multipart_error)? {
        if field.name() == Some("file") {
            let filename = field.file_name().map(|s| s.to_string());
            let bytes = field.bytes().await.map_err(map_multipart_error)?;
            upload = Some((bytes.to_vec(), filename));
        }
    }

    let (bytes, filename) = upload
        .ok_or_else(|| AppError::BadRequest("Missing multipart field 'file'".to_string()))?;

    let accepted = state
        .dispatcher
        .submit(lane, bytes, filename, options)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: SubmitResponse {
                job_id: accepted.job_id,
                status: accepted.status,
                image_info: accepted.image_info,
                options: accepted.options,
            },
        }),
    ))
}

fn map_multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(e.to_string())
    }
}

/// GET /api/v1/result/{job_id}
pub async fn get_result(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<Json<DataResponse<ResultResponse>>> {
    let record = state.store.get(job_id).await?;

    Ok(Json(DataResponse {
        data: ResultResponse {
            status: record.status,
            result: record.result,
            error: record.error,
        },
    }))
}

/// Query parameters for the active-job listing.
#[derive(Debug, Deserialize)]
pub struct ActiveParams {
    pub lane: Option<Lane>,
}

/// GET /api/v1/jobs/active?lane=
pub async fn list_active(
    State(state): State<AppState>,
    Query(params): Query<ActiveParams>,
) -> Json<DataResponse<Vec<ActiveJob>>> {
    let jobs = state.store.list_active(params.lane).await;
    Json(DataResponse { data: jobs })
}
