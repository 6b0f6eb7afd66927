use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use serde::Deserialize;

use mediagate_service::chatlog::ChatPage;

use crate::endpoints::ResponseError;
use crate::service::ServiceState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatQuery {
    page: Option<usize>,
    page_size: Option<usize>,
}

/// Serves one page of the chat log, newest page first.
pub async fn chat_page(
    State(service): State<ServiceState>,
    headers: HeaderMap,
    Query(query): Query<ChatQuery>,
) -> Result<Json<ChatPage>, ResponseError> {
    if service.auth().authorize(&headers).is_none() {
        return Err(ResponseError::unauthorized());
    }

    let page = query.page.unwrap_or(1);
    let page_size = query
        .page_size
        .unwrap_or_else(|| service.chat_log().default_page_size());

    let page = service.chat_log().page(page, page_size)?;
    Ok(Json(page))
}
