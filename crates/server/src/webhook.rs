use std::sync::Arc;

use answerbot_core::errors::ApplicationError;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use tracing::error;

use crate::handler::{HandlerResponse, InboundRequest, ResponseBody, SlackEventHandler};

pub fn router(handler: Arc<SlackEventHandler>, events_path: &str) -> Router {
    Router::new().route(events_path, post(events)).with_state(handler)
}

async fn events(
    State(handler): State<Arc<SlackEventHandler>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match handler.handle(InboundRequest::from_headers(&headers, body)).await {
        Ok(response) => into_response(response),
        Err(failure) => {
            let failure = ApplicationError::from(failure);
            error!(
                event_name = "slack.event.failed",
                error_class = failure.error_class(),
                error = %failure,
                "event handling failed"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Internal error" })))
                .into_response()
        }
    }
}

fn into_response(response: HandlerResponse) -> Response {
    match response.body {
        ResponseBody::Json(body) => (response.status, Json(body)).into_response(),
        ResponseBody::Text(text) => {
            (response.status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text)
                .into_response()
        }
    }
}
