use anyhow::Context;
use axum::http::HeaderValue;
use quire::{
    api,
    cli::{Cli, Commands},
    memory::SharedStore,
    publish::WordPressPublisher,
    utils::toml_config::StorageConfig,
    AppState, DaedraRetriever, FileStore, InMemoryStore, QuireConfig, QuireConfigManager,
    SessionService,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();

    let config_manager = QuireConfigManager::new(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let config = config_manager.config();

    init_tracing(&config.server.log_level, cli.verbose, cli.json_logs);

    match cli.command() {
        Commands::Check => {
            println!(
                "{} is valid (llm: {}, model: {}, listening on {})",
                cli.config.display(),
                config.provider()?.name(),
                config.provider()?.model(),
                config.bind_address()
            );
            Ok(())
        }
        Commands::Serve { watch } => serve(config_manager, watch).await,
    }
}

fn init_tracing(log_level: &str, verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { log_level };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("quire={level},tower_http={level}")));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

async fn build_service(
    config: &QuireConfig,
    config_manager: Arc<QuireConfigManager>,
) -> anyhow::Result<SessionService> {
    let store: SharedStore = match &config.storage {
        StorageConfig::File { base_dir } => {
            info!(path = %base_dir.display(), "Using filesystem coordination store");
            Arc::new(FileStore::new(base_dir))
        }
        StorageConfig::Memory => {
            warn!("Using in-memory coordination store; sessions are lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };

    let provider = config.provider()?;
    info!(provider = provider.name(), model = provider.model(), "Creating completion client");
    let llm = provider
        .create_client()
        .await
        .context("failed to create completion client")?;

    let mut retriever = DaedraRetriever::new();
    if let Some(selector) = &config.retrieval.selector {
        retriever = retriever.with_selector(selector.clone());
    }

    let mut service =
        SessionService::new(store, llm, Arc::new(retriever)).with_config(config_manager);

    if let (Some(publish), Some(password)) = (&config.publish, config.publish_password()?) {
        info!(site = %publish.site_url, "Publishing enabled");
        let publisher =
            WordPressPublisher::new(publish.site_url.as_str(), publish.username.as_str(), password)?;
        service = service.with_publisher(Arc::new(publisher));
    }

    Ok(service)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

async fn serve(mut config_manager: QuireConfigManager, watch: bool) -> anyhow::Result<()> {
    if watch {
        config_manager
            .start_watching()
            .context("failed to watch configuration file")?;
    }

    let config = config_manager.config();
    let sessions = build_service(&config, Arc::new(config_manager)).await?;
    let state = AppState { sessions };

    #[allow(unused_mut)]
    let mut app = api::routes::app(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.server.cors_origins));

    #[cfg(feature = "swagger-ui")]
    {
        use utoipa::OpenApi;
        app = app.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api::ApiDoc::openapi()),
        );
    }

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!(%address, "Quire server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
}
