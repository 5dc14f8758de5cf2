#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_tungstenite::accept_async;

use config::Config;
use hypertcp_bridge::relay::bridge_connection;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    simple_logger::init_with_level(config.log.level.as_level())?;

    let listener = TcpListener::bind(config.bridge.listen).await?;
    log::info!(
        "HyperTCP websocket bridge listening on {}, forwarding to broker at {}",
        config.bridge.listen,
        config.bridge.broker
    );

    let mut connections = JoinSet::new();

    tokio::select! {
        result = accept_loop(listener, config.bridge.broker, &mut connections) => {
            if let Err(err) = result {
                log::error!("accept loop ended with an error: {err}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("received shutdown signal, no longer accepting new connections");
        }
    }

    log::info!("waiting for {} connection(s) to close", connections.len());
    while connections.join_next().await.is_some() {}

    Ok(())
}

async fn accept_loop(
    listener: TcpListener,
    broker_addr: SocketAddr,
    connections: &mut JoinSet<()>,
) -> anyhow::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;

        connections.spawn(async move {
            let ws = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(err) => {
                    log::warn!("websocket handshake with {addr} failed: {err}");
                    return;
                }
            };

            log::info!("bridging {addr} to {broker_addr}");
            if let Err(err) = bridge_connection(ws, broker_addr).await {
                log::warn!("bridge session for {addr} ended with an error: {err}");
            }
        });
    }
}
