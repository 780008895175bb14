//! Wires configuration into the running service: stores, pool, page
//! manager, executor, auth/audit, and every protocol adapter. Grounded in
//! the teacher's `api::AppState` + `main.rs` construction sequence,
//! generalized from one HTTP router to REST + WS + gRPC + MCP.

use crate::audit::{AuditSink, FileAuditSink, NullAuditSink};
use crate::auth::{AuthGate, DefaultAuthGate, Principal};
use crate::config::Config;
use crate::driver::ChromiumoxideDriver;
use crate::driver::Driver;
use crate::executor::{ActionExecutor, PipelineContext};
use crate::pages::{sweep::spawn_idle_sweep, PageManager};
use crate::pool::{BrowserPool, PoolConfig};
use crate::protocol::grpc::{self, pb};
use crate::protocol::mcp::McpServer;
use crate::protocol::middleware::RateLimiterRegistry;
use crate::protocol::{rest, ws};
use crate::session::{spawn_cleanup_task, SessionStoreFactory};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Everything the process owns after startup; held so their background
/// tasks (`JoinHandle`s) aren't dropped and cancelled.
pub struct Services {
    pub config: Config,
    pub executor: Arc<ActionExecutor>,
    pub pages: Arc<PageManager>,
    pub sessions: Arc<dyn crate::session::SessionStore>,
    pub auth: Arc<dyn AuthGate>,
    pub audit: Arc<dyn AuditSink>,
    pub limiter: Arc<RateLimiterRegistry>,
    background: Vec<tokio::task::JoinHandle<()>>,
}

impl Services {
    pub async fn build(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let sessions = SessionStoreFactory::build(&config).await;
        let cleanup = spawn_cleanup_task(sessions.clone(), config.session_cleanup_interval);

        let audit: Arc<dyn AuditSink> = if config.audit_log_enabled {
            Arc::new(FileAuditSink::spawn(config.audit_log_path.clone().into(), 1024))
        } else {
            Arc::new(NullAuditSink)
        };

        let auth: Arc<dyn AuthGate> = Arc::new(DefaultAuthGate::new(
            config.jwt_secret.clone(),
            HashMap::new(),
            sessions.clone(),
            audit.clone(),
        ));

        let driver: Arc<dyn Driver> = Arc::new(ChromiumoxideDriver::new());

        let pool = BrowserPool::new(
            driver.clone(),
            PoolConfig {
                min_size: config.browser_pool_min_size,
                max_size: config.browser_pool_max_size,
                ..PoolConfig::default()
            },
        );
        let maintenance = pool.spawn_maintenance();

        let pages = Arc::new(PageManager::new(pool, driver.clone()));
        let idle_sweep = spawn_idle_sweep(
            pages.clone(),
            chrono::Duration::from_std(config.browser_idle_timeout).unwrap_or(chrono::Duration::minutes(5)),
            std::time::Duration::from_secs(60),
        );

        let ctx = PipelineContext {
            dispatcher: Arc::new(crate::actions::ActionDispatcher::default()),
            validator: Arc::new(crate::actions::ActionValidator::new(Default::default())),
            pages: pages.clone(),
            driver,
            audit: audit.clone(),
        };
        let executor = Arc::new(ActionExecutor::new(ctx));

        let limiter = Arc::new(RateLimiterRegistry::new(120));

        Ok(Self {
            config,
            executor,
            pages,
            sessions,
            auth,
            audit,
            limiter,
            background: vec![cleanup, maintenance, idle_sweep],
        })
    }

    fn rest_router(&self) -> axum::Router {
        rest::router(rest::RestState {
            sessions: self.sessions.clone(),
            pages: self.pages.clone(),
            executor: self.executor.clone(),
            auth: self.auth.clone(),
            limiter: self.limiter.clone(),
        })
    }

    fn ws_router(&self) -> axum::Router {
        axum::Router::new()
            .route(&self.config.ws_path, axum::routing::get(ws::ws_handler))
            .with_state(ws::WsState {
                pool: self.pages.pool().clone(),
                executor: self.executor.clone(),
                auth: self.auth.clone(),
                limiter: self.limiter.clone(),
                heartbeat_interval: self.config.ws_heartbeat_interval,
            })
    }

    /// Serves REST + (optionally) WebSocket on one HTTP listener, matching
    /// the teacher's single-router `axum::serve` shape.
    pub async fn serve_http(&self, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> Result<(), Box<dyn std::error::Error>> {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let mut app = self.rest_router();
        if self.config.ws_enabled {
            app = app.merge(self.ws_router());
        }
        let app = app.layer(TraceLayer::new_for_http()).layer(cors);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        tracing::info!(%addr, "HTTP (REST/WS) listening");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
        Ok(())
    }

    pub async fn serve_grpc(&self, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> Result<(), Box<dyn std::error::Error>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port + 1));
        tracing::info!(%addr, "gRPC listening");
        tonic::transport::Server::builder()
            .add_service(grpc::session_server(self.sessions.clone(), self.auth.clone()))
            .add_service(grpc::context_server(self.pages.clone(), self.auth.clone()))
            .add_service(pb::health_service_server::HealthServiceServer::new(grpc::HealthGrpcService))
            .serve_with_shutdown(addr, shutdown)
            .await?;
        Ok(())
    }

    /// MCP over stdio: a single long-lived admin-scoped principal, matching
    /// the teacher's single-process CLI tool surface.
    pub async fn serve_mcp_stdio(&self) -> Result<(), Box<dyn std::error::Error>> {
        use rmcp::ServiceExt;
        let server = McpServer {
            sessions: self.sessions.clone(),
            pages: self.pages.clone(),
            executor: self.executor.clone(),
            principal: Principal { user_id: "system:mcp".into(), roles: vec!["admin".into()], scopes: vec![], session_id: None },
        };
        let transport = (tokio::io::stdin(), tokio::io::stdout());
        let service = server.serve(transport).await?;
        service.waiting().await?;
        Ok(())
    }
}
