use std::env;
use tower_http::trace::TraceLayer;
use trellis::prelude::*;

mod cats;

use cats::CatsModule;

#[derive(Injectable)]
pub struct Logger;

impl Logger {
    pub fn log(&self, message: &str) {
        tracing::info!(target: "ping-server", "{}", message);
    }
}

#[derive(Injectable)]
pub struct PingController {
    logger: Arc<Logger>,
}

impl Controller for PingController {
    fn declare(routes: &mut ControllerDeclaration<Self>) {
        routes.path("/ping");
        routes.get("/").handle("ping", |this, _args| async move {
            this.logger.log("ping");
            Ok::<_, HttpException>(json!({ "ok": true }))
        });
    }
}

pub struct AppModule;

impl Module for AppModule {
    fn declare(module: &mut ModuleDeclaration) {
        module
            .import_ref(ConfigModule::for_root())
            .import::<CatsModule>()
            .provider(Provider::class::<Logger>())
            .controller::<PingController>();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let options = ApplicationOptions::from_env();
    let host = options.host.clone();
    let port: u16 = env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(3000);

    let mut app = TrellisFactory::with_options(options).bootstrap(&ModuleRef::of::<AppModule>())?;
    app.use_global_interceptor(LoggingInterceptor);
    app.init().await?;

    let lifecycle = app.lifecycle();
    let router = app.into_router().layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    tracing::info!("Server running on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    lifecycle.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}
