// src/main.rs
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::Client as S3Client;
use dotenvy::dotenv;
use sqlx::PgPool;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use toolsite::api::stripe_client::StripeClient;
use toolsite::config::Config;
use toolsite::db::PgStore;
use toolsite::mailer::{LogMailer, Mailer, ResendMailer};
use toolsite::storage::S3ArtifactStore;
use toolsite::tools::media::FfprobeDurationProbe;
use toolsite::tools::transcript::OpenAiTranscriber;
use toolsite::tools::ToolExecutor;
use toolsite::{api, docs, AppState};

fn fatal(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    log::error!("{context}: {err}");
    std::io::Error::new(std::io::ErrorKind::Other, format!("{context}: {err}"))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| fatal("configuration", e))?;

    let pool = PgPool::connect(&config.database_url)
        .await
        .map_err(|e| fatal("failed to connect to DB", e))?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .map_err(|e| fatal("failed to run migrations", e))?;

    let region_provider = RegionProviderChain::default_provider().or_else("us-east-1");
    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await;
    let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);

    // Custom S3-compatible endpoints (MinIO, R2, ...) need path-style URLs.
    if let Some(endpoint) = &config.s3_endpoint {
        s3_config_builder = s3_config_builder
            .endpoint_url(endpoint)
            .force_path_style(true);
    }

    let s3_client = S3Client::from_conf(s3_config_builder.build());

    let store = Arc::new(PgStore::new(pool));
    let mailer: Arc<dyn Mailer> = match (&config.resend_api_key, &config.request_email_to) {
        (Some(key), Some(to)) => Arc::new(
            ResendMailer::new(&config.resend_api_base, key, &config.request_email_from, to)
                .map_err(|e| fatal("failed to build email client", e))?,
        ),
        _ => {
            log::warn!("RESEND_API_KEY or REQUEST_EMAIL_TO not set, tool requests are only logged");
            Arc::new(LogMailer)
        }
    };

    let stripe = StripeClient::new(&config.stripe_api_base, &config.stripe_secret_key)
        .map_err(|e| fatal("failed to build Stripe client", e))?;
    let transcriber = OpenAiTranscriber::new(&config.openai_api_base, &config.openai_api_key)
        .map_err(|e| fatal("failed to build OpenAI client", e))?;

    let bind = (config.bind_addr.clone(), config.port);
    let state = web::Data::new(AppState {
        catalog: store.clone(),
        credits: store.clone(),
        operations: store,
        artifacts: Arc::new(S3ArtifactStore::new(
            s3_client,
            &config.s3_bucket,
            config.signed_url_ttl,
        )),
        checkout: Arc::new(stripe),
        probe: Arc::new(FfprobeDurationProbe::new(&config.ffprobe_path)),
        executor: ToolExecutor::new(Arc::new(transcriber)),
        mailer,
        config: Arc::new(config),
    });

    log::info!("listening on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            .configure(api::configure)
    })
    .bind(bind)?
    .run()
    .await
}
