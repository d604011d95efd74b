use anyhow::Context as _;
use axum::{
    Router,
    routing::{any, post},
};
use clap::Parser as _;
use tower_http::{
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use crate::handlers::generate::Proxy;
use crate::services::{generation::GeneratePage, persistence::SaveBlocks};

mod config;
mod handlers;
mod responses;
mod services;

const SAVE_FUNCTION: &str = "save-content-block";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,server=debug")),
        )
        .init();
    if let Err(e) = dotenv {
        tracing::debug!(error = %e, "no dotenv file loaded");
    }

    let config = config::Config::parse();
    let generate = services::generation::http::GeneratePage::new(config.upstream_timeout())
        .context("Failed to build the generation client")?;
    let proxy = Proxy {
        service: generate,
        proxy_function: config.proxy_function.clone(),
        upstream_function: config.upstream_function.clone(),
        upstream_origin: config.upstream_origin.clone(),
    };

    let app = match &config.database_url {
        Some(url) => {
            let dbpool = sqlx::PgPool::connect(url)
                .await
                .context("Failed to connect to postgres instance")?;
            sqlx::migrate!("./migrations")
                .run(&dbpool)
                .await
                .context("Failed to migrate the database")?;
            router(&config, proxy, services::persistence::pg::SaveBlocks(dbpool))
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, content blocks are kept in memory");
            router(&config, proxy, services::persistence::memory::SaveBlocks::default())
        }
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await.context("Server stopped")?;
    Ok(())
}

fn router<Generate, Save>(config: &config::Config, proxy: Proxy<Generate>, save: Save) -> Router
where
    Generate: GeneratePage + Clone + Send + Sync + 'static,
    Save: SaveBlocks + Clone + Send + Sync + 'static,
{
    let index = ServeFile::new(&config.index_file);
    let assets = ServeDir::new(&config.assets_dir);
    Router::new()
        .route(
            &format!("/functions/v1/{}", config.proxy_function),
            any(handlers::generate::generate_page::<Generate>),
        )
        .with_state(proxy)
        .route(
            &format!("/functions/v1/{}", SAVE_FUNCTION),
            post(handlers::save::save_block::<Save>).options(responses::preflight),
        )
        .with_state(save)
        .nest_service("/assets", assets)
        .fallback_service(index)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode, header},
    };
    use clap::Parser as _;
    use http_body_util::BodyExt as _;
    use serde_json::{Value, json};
    use tower::ServiceExt as _;

    use super::*;
    use crate::services::generation::{Forward, GenerateError, Relayed};

    #[derive(Clone)]
    struct Echo;

    impl GeneratePage for Echo {
        async fn generate(&self, forward: Forward) -> Result<Relayed, GenerateError> {
            Ok(Relayed {
                status: StatusCode::OK,
                body: Value::Object(forward.body),
            })
        }
    }

    fn app() -> Router {
        let config = config::Config::try_parse_from(["server"]).unwrap();
        let proxy = Proxy {
            service: Echo,
            proxy_function: config.proxy_function.clone(),
            upstream_function: config.upstream_function.clone(),
            upstream_origin: Some("http://engine.test".to_owned()),
        };
        router(&config, proxy, services::persistence::memory::SaveBlocks::default())
    }

    #[tokio::test]
    async fn proxy_and_save_are_mounted() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/functions/v1/generate-content-page")
            .body(Body::from(r#"{"count":3}"#))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(
            serde_json::from_slice::<Value>(&body).unwrap(),
            json!({ "count": 3, "startIndex": 0 })
        );

        let request = Request::builder()
            .method(Method::POST)
            .uri("/functions/v1/save-content-block")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({
                    "block": { "specialistId": "nova", "type": "news", "content": {} }
                })
                .to_string(),
            ))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn save_function_answers_preflight() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/functions/v1/save-content-block")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
