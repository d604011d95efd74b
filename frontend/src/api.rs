use blocks::{
    ContentBlock, ContentBlockDraft, ErrorMessage, GeneratedPage, PageRequest, ProxyError,
    SaveBlockRequest, SaveBlockResponse,
};
use feed::{BlockStore, StoreError};
use gloo_net::http::{Request, RequestBuilder};
use leptos::prelude::*;
use serde::{Deserialize, Serialize};

const GENERATE_URL: &str = "/functions/v1/generate-content-page";
const SAVE_URL: &str = "/functions/v1/save-content-block";
const SESSION_KEY: &str = "curio/session";

/// Credentials left in local storage by the sign-in flow. Passed through as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Session {
    pub(crate) access_token: Option<String>,
    pub(crate) api_key: Option<String>,
}

pub(crate) fn use_session() -> Signal<Session> {
    let (session, _, _) = leptos_use::storage::use_local_storage::<
        Session,
        codee::string::JsonSerdeCodec,
    >(SESSION_KEY);
    session
}

fn authorized(builder: RequestBuilder, session: &Session) -> RequestBuilder {
    let builder = match &session.access_token {
        Some(token) => builder.header("authorization", &format!("Bearer {}", token)),
        None => builder,
    };
    match &session.api_key {
        Some(key) => builder.header("apikey", key),
        None => builder,
    }
}

#[derive(Debug, Clone)]
pub(crate) enum AppError {
    GenerateError(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, w: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::GenerateError(cause) => {
                write!(w, "Failed to generate more content due to: {}", cause)
            }
        }
    }
}

impl std::error::Error for AppError {}

pub(crate) async fn generate_page(
    request: &PageRequest,
    session: &Session,
) -> Result<GeneratedPage, AppError> {
    let resp = authorized(Request::post(GENERATE_URL), session)
        .header("accept", "application/json")
        .json(request)
        .map_err(|e| AppError::GenerateError(e.to_string()))?
        .send()
        .await
        .map_err(|e| AppError::GenerateError(e.to_string()))?;

    if !resp.ok() {
        let cause = match resp.json::<ProxyError>().await {
            Ok(ProxyError { error }) => error,
            Err(_) => format!("status {}", resp.status()),
        };
        return Err(AppError::GenerateError(cause));
    }

    resp.json()
        .await
        .map_err(|e| AppError::GenerateError(e.to_string()))
}

/// [`BlockStore`] calling the backend's save function.
#[derive(Clone, Copy)]
pub(crate) struct HttpStore {
    session: Signal<Session>,
}

impl HttpStore {
    pub(crate) fn new(session: Signal<Session>) -> Self {
        Self { session }
    }
}

impl BlockStore for HttpStore {
    async fn upsert(&self, draft: &ContentBlockDraft) -> Result<ContentBlock, StoreError> {
        let body = SaveBlockRequest {
            block: draft.clone(),
        };
        let resp = authorized(Request::post(SAVE_URL), &self.session.get_untracked())
            .json(&body)
            .map_err(|e| StoreError::Transport(e.to_string()))?
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if !resp.ok() {
            let message = match resp.json::<ErrorMessage>().await {
                Ok(ErrorMessage { message }) => message,
                Err(_) => format!("Save failed with status {}", resp.status()),
            };
            return Err(StoreError::Rejected { message });
        }

        resp.json::<SaveBlockResponse>()
            .await
            .map(|SaveBlockResponse { block }| block)
            .map_err(|e| StoreError::Transport(e.to_string()))
    }
}
