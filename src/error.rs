use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{
    catalog::CatalogLoadError,
    services::{candidates::NoCandidatesError, validator::ValidationError},
};

/// Terminal outcomes of one recommendation cycle
///
/// Per-attempt validation errors stay inside the engine; only these cross
/// its boundary.
#[derive(thiserror::Error, Debug)]
pub enum RecommendError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    NoCandidates(#[from] NoCandidatesError),

    #[error("model unavailable after {attempts} call(s): {reason}")]
    ModelUnavailable { attempts: u32, reason: String },

    #[error("no valid recommendation after {attempts} attempt(s); last error: {last_error}")]
    RecommendationFailed {
        attempts: u32,
        last_error: ValidationError,
    },

    #[error("recommendation cancelled")]
    Cancelled,
}

impl RecommendError {
    pub fn kind(&self) -> &'static str {
        match self {
            RecommendError::InvalidRequest(_) => "invalid_request",
            RecommendError::NoCandidates(_) => "no_candidates",
            RecommendError::ModelUnavailable { .. } => "model_unavailable",
            RecommendError::RecommendationFailed { .. } => "recommendation_failed",
            RecommendError::Cancelled => "cancelled",
        }
    }
}

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Recommend(#[from] RecommendError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogLoadError),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Messages are what the user sees; raw model failures are only logged
        let (status, kind, message) = match &self {
            AppError::Recommend(err) => {
                let status = match err {
                    RecommendError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                    RecommendError::NoCandidates(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    RecommendError::ModelUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    RecommendError::RecommendationFailed { .. } => StatusCode::BAD_GATEWAY,
                    // Client went away; nobody reads this
                    RecommendError::Cancelled => StatusCode::REQUEST_TIMEOUT,
                };
                let message = match err {
                    RecommendError::InvalidRequest(msg) => msg.clone(),
                    RecommendError::NoCandidates(err) if !err.missing_roles.is_empty() => {
                        let roles: Vec<&str> =
                            err.missing_roles.iter().map(|role| role.as_str()).collect();
                        format!(
                            "No products fit a full outfit: nothing suitable for {}. Try a higher \
                             budget or fewer filters.",
                            roles.join(", ")
                        )
                    }
                    RecommendError::NoCandidates(_) => {
                        "No products match your criteria. Try broadening your search.".to_string()
                    }
                    RecommendError::ModelUnavailable { .. }
                    | RecommendError::RecommendationFailed { .. } => {
                        "The style advisor could not put together a recommendation. Please try again."
                            .to_string()
                    }
                    RecommendError::Cancelled => "Request cancelled.".to_string(),
                };
                (status, err.kind(), message)
            }
            AppError::Catalog(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "catalog_unavailable",
                self.to_string(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, kind, "Request failed");
        } else {
            tracing::info!(error = %self, kind, "Request rejected");
        }

        let body = Json(json!({
            "error": kind,
            "message": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use rust_decimal::Decimal;

    #[test]
    fn test_failed_recommendation_hides_validation_detail() {
        let err = AppError::from(RecommendError::RecommendationFailed {
            attempts: 3,
            last_error: ValidationError::BudgetExceeded {
                total: Decimal::new(160, 0),
                budget: Decimal::new(150, 0),
            },
        });

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            RecommendError::NoCandidates(NoCandidatesError::nothing_matched(4)).kind(),
            "no_candidates"
        );
        assert_eq!(
            RecommendError::ModelUnavailable {
                attempts: 3,
                reason: "timeout".to_string()
            }
            .kind(),
            "model_unavailable"
        );
    }

    #[tokio::test]
    async fn test_missing_outfit_roles_are_named_to_the_user() {
        let err = AppError::from(RecommendError::NoCandidates(NoCandidatesError {
            considered: 12,
            missing_roles: vec![Role::Footwear],
        }));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "no_candidates");
        assert!(body["message"].as_str().unwrap().contains("footwear"));
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                AppError::from(RecommendError::InvalidRequest("no budget".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(RecommendError::NoCandidates(NoCandidatesError::nothing_matched(0))),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::from(RecommendError::ModelUnavailable {
                    attempts: 3,
                    reason: "503".to_string(),
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (AppError::NotFound("p-1".to_string()), StatusCode::NOT_FOUND),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
