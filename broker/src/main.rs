#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;

use std::sync::Arc;
use std::time::Duration;

use hypertcp::session::{run_session, SessionConfig};
use hypertcp::{Registry, StaticAuthenticator};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    simple_logger::init_with_level(config.log.level.as_level())?;

    let listener = TcpListener::bind(config.broker.listen).await?;
    log::info!("HyperTCP broker listening on {}", config.broker.listen);

    let registry = Arc::new(Registry::new());
    let authenticator = Arc::new(StaticAuthenticator::new(
        config.broker.auth_token.clone(),
        config.broker.admin_token.clone(),
    ));
    let idle_timeout = config.broker.idle_timeout_secs.map(Duration::from_secs);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sessions = JoinSet::new();

    tokio::select! {
        result = accept_loop(listener, registry, authenticator, idle_timeout, shutdown_rx, &mut sessions) => {
            if let Err(err) = result {
                log::error!("accept loop ended with an error: {err}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("received shutdown signal, closing connections");
            let _ = shutdown_tx.send(true);
        }
    }

    log::info!("waiting for {} session(s) to close", sessions.len());
    while sessions.join_next().await.is_some() {}

    Ok(())
}

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<Registry>,
    authenticator: Arc<dyn hypertcp::Authenticator>,
    idle_timeout: Option<Duration>,
    shutdown_rx: watch::Receiver<bool>,
    sessions: &mut JoinSet<()>,
) -> anyhow::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let registry = registry.clone();
        let authenticator = authenticator.clone();
        let session_config = SessionConfig {
            idle_timeout,
            shutdown: Some(shutdown_rx.clone()),
        };

        sessions.spawn(async move {
            if let Err(err) = run_session(stream, addr, registry, authenticator, session_config).await {
                log::error!("session for {addr} ended with an error: {err}");
            }
        });
    }
}
