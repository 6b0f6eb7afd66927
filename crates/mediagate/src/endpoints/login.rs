use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::endpoints::ResponseError;
use crate::service::ServiceState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

/// Exchanges admin credentials for a session token.
pub async fn handle_login(
    State(service): State<ServiceState>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ResponseError> {
    if !service
        .auth()
        .check_credentials(&request.username, &request.password)
    {
        tracing::debug!("rejected login for {:?}", request.username);
        let mut response = Json(LoginResponse {
            success: false,
            token: None,
        })
        .into_response();
        *response.status_mut() = StatusCode::UNAUTHORIZED;
        return Ok(response);
    }

    let token = service
        .auth()
        .issue_token(&request.username)
        .map_err(anyhow::Error::from)?;

    tracing::info!("issued session token for {:?}", request.username);
    Ok(Json(LoginResponse {
        success: true,
        token: Some(token),
    })
    .into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckResponse {
    logged_in: bool,
}

/// Reports whether the request carries a valid session token.
pub async fn check_session(
    State(service): State<ServiceState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    Json(CheckResponse {
        logged_in: service.auth().authorize(&headers).is_some(),
    })
}
