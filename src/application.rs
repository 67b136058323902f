use crate::config::Settings;
use crate::proxy::ProxyService;
use crate::Result;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

/// Main application struct that coordinates all components
pub struct Application {
    settings: Settings,
}

impl Application {
    pub fn new() -> Result<Self> {
        let settings = Settings::new()?;
        Ok(Self { settings })
    }

    #[instrument(skip(self))]
    pub async fn run(self) -> Result<()> {
        let service = ProxyService::from_settings(&self.settings)?;
        let router = service.into_router();

        let addr = format!(
            "{}:{}",
            self.settings.application.host, self.settings.application.port
        );
        let listener = TcpListener::bind(&addr).await?;

        info!(
            listen = %addr,
            target = %self.settings.proxy.target_url,
            "gatehouse proxy listening"
        );

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        info!("gatehouse proxy stopped");
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// Resolves when the process is asked to stop (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("failed to install interrupt handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("shutdown signal received");
}
