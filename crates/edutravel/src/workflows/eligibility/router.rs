use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{NewDocument, NewEducationEntry, NewTestScore, ProfilePatch};
use super::repository::{AcademicRepository, EligibilityStore, EligibilityView, ProgramCatalog};
use super::service::{EligibilityService, EligibilityServiceError};
use crate::error::{error_response, json_rejection, ErrorKind};
use crate::identity::{Caller, UserId};

type SharedService<A, C, S> = Arc<EligibilityService<A, C, S>>;

/// Router exposing the academic mutation handlers and eligibility results.
pub fn eligibility_router<A, C, S>(service: SharedService<A, C, S>) -> Router
where
    A: AcademicRepository + 'static,
    C: ProgramCatalog + 'static,
    S: EligibilityStore + 'static,
{
    Router::new()
        .route("/api/v1/eligibility", get(results_handler::<A, C, S>))
        .route(
            "/api/v1/eligibility/recompute",
            post(recompute_handler::<A, C, S>),
        )
        .route(
            "/api/v1/academic-profile",
            patch(update_profile_handler::<A, C, S>),
        )
        .route(
            "/api/v1/education-history",
            post(add_education_handler::<A, C, S>),
        )
        .route(
            "/api/v1/education-history/:entry_id",
            delete(remove_education_handler::<A, C, S>),
        )
        .route("/api/v1/test-scores", post(add_test_score_handler::<A, C, S>))
        .route(
            "/api/v1/test-scores/:score_id",
            delete(remove_test_score_handler::<A, C, S>),
        )
        .route("/api/v1/documents", post(add_document_handler::<A, C, S>))
        .route(
            "/api/v1/users/:user_id/documents/:document_id/verify",
            post(verify_document_handler::<A, C, S>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TargetUser {
    #[serde(default)]
    pub(crate) user_id: Option<String>,
}

pub(crate) async fn recompute_handler<A, C, S>(
    State(service): State<SharedService<A, C, S>>,
    headers: HeaderMap,
    Query(target): Query<TargetUser>,
) -> Response
where
    A: AcademicRepository + 'static,
    C: ProgramCatalog + 'static,
    S: EligibilityStore + 'static,
{
    let caller = match Caller::from_headers(&headers) {
        Ok(caller) => caller,
        Err(err) => return error_response(ErrorKind::Unauthorized, err.to_string()),
    };

    let user_id = match target.user_id {
        Some(other) if other != caller.user_id.0 => {
            if !caller.is_admin() {
                return error_response(
                    ErrorKind::Forbidden,
                    "only administrators may recompute for another user",
                );
            }
            UserId(other)
        }
        _ => caller.user_id.clone(),
    };

    match service.recompute_now(&user_id) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => service_error(err),
    }
}

pub(crate) async fn results_handler<A, C, S>(
    State(service): State<SharedService<A, C, S>>,
    headers: HeaderMap,
) -> Response
where
    A: AcademicRepository + 'static,
    C: ProgramCatalog + 'static,
    S: EligibilityStore + 'static,
{
    let caller = match Caller::from_headers(&headers) {
        Ok(caller) => caller,
        Err(err) => return error_response(ErrorKind::Unauthorized, err.to_string()),
    };

    match service.results(&caller.user_id) {
        Ok(results) => {
            let views: Vec<EligibilityView> =
                results.into_iter().map(EligibilityView::from).collect();
            (StatusCode::OK, Json(json!({ "results": views }))).into_response()
        }
        Err(err) => service_error(err),
    }
}

pub(crate) async fn update_profile_handler<A, C, S>(
    State(service): State<SharedService<A, C, S>>,
    headers: HeaderMap,
    body: Result<Json<ProfilePatch>, JsonRejection>,
) -> Response
where
    A: AcademicRepository + 'static,
    C: ProgramCatalog + 'static,
    S: EligibilityStore + 'static,
{
    let caller = match Caller::from_headers(&headers) {
        Ok(caller) => caller,
        Err(err) => return error_response(ErrorKind::Unauthorized, err.to_string()),
    };
    let Json(patch) = match body {
        Ok(body) => body,
        Err(rejection) => return json_rejection(rejection),
    };

    match service.update_profile(&caller.user_id, patch, Utc::now().date_naive()) {
        Ok((profile, eligibility)) => (
            StatusCode::OK,
            Json(json!({ "profile": profile, "eligibility": eligibility })),
        )
            .into_response(),
        Err(err) => service_error(err),
    }
}

pub(crate) async fn add_education_handler<A, C, S>(
    State(service): State<SharedService<A, C, S>>,
    headers: HeaderMap,
    body: Result<Json<NewEducationEntry>, JsonRejection>,
) -> Response
where
    A: AcademicRepository + 'static,
    C: ProgramCatalog + 'static,
    S: EligibilityStore + 'static,
{
    let caller = match Caller::from_headers(&headers) {
        Ok(caller) => caller,
        Err(err) => return error_response(ErrorKind::Unauthorized, err.to_string()),
    };
    let Json(entry) = match body {
        Ok(body) => body,
        Err(rejection) => return json_rejection(rejection),
    };

    match service.add_education_entry(&caller.user_id, entry, Utc::now().date_naive()) {
        Ok((entry, eligibility)) => (
            StatusCode::CREATED,
            Json(json!({ "entry": entry, "eligibility": eligibility })),
        )
            .into_response(),
        Err(err) => service_error(err),
    }
}

pub(crate) async fn remove_education_handler<A, C, S>(
    State(service): State<SharedService<A, C, S>>,
    headers: HeaderMap,
    Path(entry_id): Path<String>,
) -> Response
where
    A: AcademicRepository + 'static,
    C: ProgramCatalog + 'static,
    S: EligibilityStore + 'static,
{
    let caller = match Caller::from_headers(&headers) {
        Ok(caller) => caller,
        Err(err) => return error_response(ErrorKind::Unauthorized, err.to_string()),
    };

    match service.remove_education_entry(&caller.user_id, &entry_id, Utc::now().date_naive()) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => service_error(err),
    }
}

pub(crate) async fn add_test_score_handler<A, C, S>(
    State(service): State<SharedService<A, C, S>>,
    headers: HeaderMap,
    body: Result<Json<NewTestScore>, JsonRejection>,
) -> Response
where
    A: AcademicRepository + 'static,
    C: ProgramCatalog + 'static,
    S: EligibilityStore + 'static,
{
    let caller = match Caller::from_headers(&headers) {
        Ok(caller) => caller,
        Err(err) => return error_response(ErrorKind::Unauthorized, err.to_string()),
    };
    let Json(score) = match body {
        Ok(body) => body,
        Err(rejection) => return json_rejection(rejection),
    };

    match service.add_test_score(&caller.user_id, score, Utc::now().date_naive()) {
        Ok((score, eligibility)) => (
            StatusCode::CREATED,
            Json(json!({ "score": score, "eligibility": eligibility })),
        )
            .into_response(),
        Err(err) => service_error(err),
    }
}

pub(crate) async fn remove_test_score_handler<A, C, S>(
    State(service): State<SharedService<A, C, S>>,
    headers: HeaderMap,
    Path(score_id): Path<String>,
) -> Response
where
    A: AcademicRepository + 'static,
    C: ProgramCatalog + 'static,
    S: EligibilityStore + 'static,
{
    let caller = match Caller::from_headers(&headers) {
        Ok(caller) => caller,
        Err(err) => return error_response(ErrorKind::Unauthorized, err.to_string()),
    };

    match service.remove_test_score(&caller.user_id, &score_id, Utc::now().date_naive()) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => service_error(err),
    }
}

pub(crate) async fn add_document_handler<A, C, S>(
    State(service): State<SharedService<A, C, S>>,
    headers: HeaderMap,
    body: Result<Json<NewDocument>, JsonRejection>,
) -> Response
where
    A: AcademicRepository + 'static,
    C: ProgramCatalog + 'static,
    S: EligibilityStore + 'static,
{
    let caller = match Caller::from_headers(&headers) {
        Ok(caller) => caller,
        Err(err) => return error_response(ErrorKind::Unauthorized, err.to_string()),
    };
    let Json(document) = match body {
        Ok(body) => body,
        Err(rejection) => return json_rejection(rejection),
    };

    match service.add_document(&caller.user_id, document, Utc::now().date_naive()) {
        Ok((document, eligibility)) => (
            StatusCode::CREATED,
            Json(json!({ "document": document, "eligibility": eligibility })),
        )
            .into_response(),
        Err(err) => service_error(err),
    }
}

pub(crate) async fn verify_document_handler<A, C, S>(
    State(service): State<SharedService<A, C, S>>,
    headers: HeaderMap,
    Path((user_id, document_id)): Path<(String, String)>,
) -> Response
where
    A: AcademicRepository + 'static,
    C: ProgramCatalog + 'static,
    S: EligibilityStore + 'static,
{
    let caller = match Caller::from_headers(&headers) {
        Ok(caller) => caller,
        Err(err) => return error_response(ErrorKind::Unauthorized, err.to_string()),
    };

    let user_id = UserId(user_id);
    match service.verify_document(&caller, &user_id, &document_id, Utc::now().date_naive()) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => service_error(err),
    }
}

fn service_error(err: EligibilityServiceError) -> Response {
    let kind = err.kind();
    if kind == ErrorKind::Internal {
        error!(error = %err, "eligibility request failed");
        return error_response(kind, "internal server error");
    }
    error_response(kind, err.to_string())
}
