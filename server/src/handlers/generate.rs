use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::responses::{CORS_HEADERS, ProxyFailure, ROUTING_HEADER};
use crate::services::generation::{Forward, GenerateError, GeneratePage, Relayed};

/// Forwards page requests to the generation engine living next to this proxy.
#[derive(Clone)]
pub(crate) struct Proxy<Service> {
    pub(crate) service: Service,
    pub(crate) proxy_function: String,
    pub(crate) upstream_function: String,
    /// Origin the sibling url is built on. Falls back to the request's host.
    pub(crate) upstream_origin: Option<String>,
}

impl<Service> Proxy<Service> {
    fn upstream_url(&self, uri: &Uri, headers: &HeaderMap) -> Result<reqwest::Url, GenerateError> {
        let origin = match &self.upstream_origin {
            Some(origin) => origin.trim_end_matches('/').to_owned(),
            None => {
                let host = headers
                    .get(header::HOST)
                    .and_then(|host| host.to_str().ok())
                    .ok_or_else(|| GenerateError::Url("request carries no host".to_owned()))?;
                format!("http://{}", host)
            }
        };
        let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

        sibling_url(
            &format!("{}{}", origin, path_and_query),
            &self.proxy_function,
            &self.upstream_function,
        )
    }
}

pub(crate) async fn generate_page<Service>(
    State(proxy): State<Proxy<Service>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    Service: GeneratePage,
{
    if method == Method::OPTIONS {
        return crate::responses::preflight().await;
    }
    if method != Method::POST {
        return ProxyFailure::new(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("Method {} not allowed, use POST", method),
        )
        .into_response();
    }

    match forward(&proxy, &uri, &headers, &body).await {
        Ok(Relayed { status, body }) => {
            tracing::debug!(%status, "relaying generation response");
            (status, CORS_HEADERS, Json(body)).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "generation request failed");
            ProxyFailure::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn forward<Service>(
    proxy: &Proxy<Service>,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Relayed, GenerateError>
where
    Service: GeneratePage,
{
    let Value::Object(mut request) =
        serde_json::from_slice(body).map_err(|e| GenerateError::Body(e.to_string()))?
    else {
        return Err(GenerateError::Body("expected a JSON object".to_owned()));
    };
    blocks::apply_defaults(&mut request);

    let url = proxy.upstream_url(uri, headers)?;
    tracing::info!(
        %url,
        count = ?request.get("count"),
        start_index = ?request.get("startIndex"),
        "forwarding page request"
    );

    proxy
        .service
        .generate(Forward {
            url,
            authorization: passthrough(headers, header::AUTHORIZATION.as_str()),
            routing: passthrough(headers, ROUTING_HEADER),
            body: request,
        })
        .await
}

fn passthrough(headers: &HeaderMap, name: &str) -> HeaderValue {
    headers
        .get(name)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(""))
}

/// Swaps the path segment naming this proxy for the upstream function's name.
pub(crate) fn sibling_url(current: &str, from: &str, to: &str) -> Result<reqwest::Url, GenerateError> {
    let mut url = reqwest::Url::parse(current).map_err(|e| GenerateError::Url(e.to_string()))?;

    let mut replaced = false;
    let mut segments = Vec::new();
    for segment in url.path_segments().into_iter().flatten() {
        if segment == from && !replaced {
            replaced = true;
            segments.push(to.to_owned());
        } else {
            segments.push(segment.to_owned());
        }
    }
    if !replaced {
        return Err(GenerateError::Url(format!(
            "path {} does not name {}",
            url.path(),
            from
        )));
    }

    url.path_segments_mut()
        .map_err(|_| GenerateError::Url(format!("{} cannot carry a path", current)))?
        .clear()
        .extend(&segments);
    Ok(url)
}
