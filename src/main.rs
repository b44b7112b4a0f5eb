use actix_web::{web, App, HttpServer};
use live_chat_service::{
    config, db, error, logging, metrics,
    redis_client::RedisClient,
    routes,
    state::AppState,
    store::{ChatStore, MemoryStore, PgStore},
    websocket::{
        broadcast::{BroadcastRouter, Relay},
        pubsub::start_relay_listener,
        ConnectionRegistry,
    },
};
use std::sync::Arc;
use tracing_actix_web::TracingLogger;
use uuid::Uuid;

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    let cfg = Arc::new(config::Config::from_env()?);
    logging::init_tracing(cfg.log_format);
    metrics::init();

    let store: Arc<dyn ChatStore> = match &cfg.database_url {
        Some(url) => {
            let pool = db::init_pool(url, cfg.database_max_connections)?;
            db::run_migrations(&pool).await?;
            tracing::info!(max_connections = cfg.database_max_connections, "using postgres store");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let registry = ConnectionRegistry::new();
    let mut router = BroadcastRouter::new(registry.clone());

    // Cross-instance relay
    if let Some(url) = &cfg.redis_url {
        let redis = RedisClient::from_url(url)
            .await
            .map_err(|e| error::AppError::StartServer(format!("redis: {e}")))?;
        let instance_id = Uuid::new_v4();
        router = router.with_relay(Relay {
            redis: redis.clone(),
            instance_id,
        });

        let client = redis.client();
        let relay_registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = start_relay_listener(client, relay_registry, instance_id).await {
                tracing::error!(error = %e, "relay listener failed");
            }
        });
        tracing::info!(%instance_id, "cross-instance relay enabled");
    }

    let state = AppState::new(store, router, cfg.clone());
    let _sweeper = state.presence.spawn_sweeper(cfg.presence.sweep_interval);

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting live-chat-service");

    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure_routes)
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("server: {e}")))
}
