use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use blocks::{SaveBlockRequest, SaveBlockResponse};

use crate::responses::CORS_HEADERS;
use crate::services::persistence::{SaveBlocks, SaveBlocksError};

pub(crate) async fn save_block<Service>(
    State(service): State<Service>,
    request: Result<Json<SaveBlockRequest>, JsonRejection>,
) -> Response
where
    Service: SaveBlocks,
{
    let Json(SaveBlockRequest { block }) = match request {
        Ok(request) => request,
        Err(rejection) => {
            return crate::responses::Error::new(rejection.status(), rejection.body_text())
                .into_response();
        }
    };

    if block.specialist_id.trim().is_empty() {
        return crate::responses::Error::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Blocks must name the specialist that produced them.".to_owned(),
        )
        .into_response();
    }

    match service.save(&block).await {
        Ok(block) => {
            tracing::debug!(id = %block.id, block_type = %block.block_type, "stored content block");
            (StatusCode::OK, CORS_HEADERS, Json(SaveBlockResponse { block })).into_response()
        }
        Err(e @ SaveBlocksError::KeyTaken(_)) => {
            tracing::warn!(error = %e, "rejected content block");
            crate::responses::Error::new(StatusCode::CONFLICT, e.to_string()).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to store content block");
            crate::responses::Error::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::{Body, Bytes},
        http::{Method, Request, header},
        routing::post,
    };
    use blocks::{ContentBlock, ContentBlockDraft};
    use http_body_util::BodyExt as _;
    use serde_json::{Value, json};
    use tower::ServiceExt as _;

    use super::*;
    use crate::services::persistence::memory;

    const SAVE_PATH: &str = "/functions/v1/save-content-block";

    fn app<S>(service: S) -> Router
    where
        S: SaveBlocks + Clone + Send + Sync + 'static,
    {
        Router::new()
            .route(SAVE_PATH, post(save_block::<S>))
            .with_state(service)
    }

    async fn call(app: Router, body: Value) -> (StatusCode, Bytes) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(SAVE_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        (status, response.into_body().collect().await.unwrap().to_bytes())
    }

    fn draft() -> Value {
        json!({
            "block": {
                "curioId": "curio-1",
                "specialistId": "nova",
                "type": "funFact",
                "content": { "fact": "Honey never spoils" },
                "draftKey": "curio-1:nova:0"
            }
        })
    }

    #[tokio::test]
    async fn stores_and_returns_the_block() {
        let store = memory::SaveBlocks::default();
        let (status, body) = call(app(store.clone()), draft()).await;

        assert_eq!(status, StatusCode::OK);
        let saved: SaveBlockResponse = serde_json::from_slice(&body).unwrap();
        assert!(!saved.block.id.is_empty());
        assert_eq!(saved.block.specialist_id, "nova");
        assert_eq!(saved.block.content, json!({ "fact": "Honey never spoils" }));
        assert!(!saved.block.liked);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn repeated_saves_are_idempotent() {
        let store = memory::SaveBlocks::default();
        let (_, first) = call(app(store.clone()), draft()).await;
        let (_, second) = call(app(store.clone()), draft()).await;

        let first: SaveBlockResponse = serde_json::from_slice(&first).unwrap();
        let second: SaveBlockResponse = serde_json::from_slice(&second).unwrap();
        assert_eq!(first.block.id, second.block.id);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn malformed_body_gets_a_message() {
        let (status, body) = call(
            app(memory::SaveBlocks::default()),
            json!({ "block": { "type": "poem" } }),
        )
        .await;

        assert!(status.is_client_error());
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn blank_specialist_is_rejected() {
        let mut body = draft();
        body["block"]["specialistId"] = json!("  ");
        let (status, body) = call(app(memory::SaveBlocks::default()), body).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert!(body["message"].as_str().unwrap().contains("specialist"));
    }

    #[tokio::test]
    async fn new_id_on_a_taken_key_is_a_conflict() {
        let store = memory::SaveBlocks::default();
        let (status, _) = call(app(store.clone()), draft()).await;
        assert_eq!(status, StatusCode::OK);

        let mut body = draft();
        body["block"]["id"] = json!("11111111-1111-4111-8111-111111111111");
        let (status, body) = call(app(store.clone()), body).await;

        assert_eq!(status, StatusCode::CONFLICT);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert!(body["message"].as_str().unwrap().contains("curio-1:nova:0"));
        assert_eq!(store.len(), 1);
    }

    #[derive(Clone)]
    struct Broken;

    impl SaveBlocks for Broken {
        async fn save(&self, _draft: &ContentBlockDraft) -> Result<ContentBlock, SaveBlocksError> {
            Err(SaveBlocksError::Corrupt("disk on fire".to_owned()))
        }
    }

    #[tokio::test]
    async fn store_failure_is_reported_as_message() {
        let (status, body) = call(app(Broken), draft()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({ "message": "Stored block is corrupt: disk on fire" }));
    }
}
