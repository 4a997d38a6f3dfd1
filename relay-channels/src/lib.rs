//! Relay Channels - chat transports wired to a ChatGPT-style backend.
//!
//! Each user gets one ongoing multi-turn conversation and at most one
//! backend call in flight. Channels:
//! - Telegram (long polling)
//! - CLI (for local testing)
//!
//! ## Architecture
//!
//! ```text
//! User IM → listen ─▶ mpsc ─▶ SessionOrchestrator ─▶ Backend
//!                                   │
//! User ←── deliver / typing ◀───────┘
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod backend;
pub mod cli;
pub mod message;
pub mod routes;
pub mod session;
pub mod telegram;
pub mod traits;

// Re-export commonly used types
pub use backend::{Backend, BackendError, BackendReply, ChatGptBackend, ConverseOptions};
pub use cli::CliChannel;
pub use message::{ChannelMessage, ChannelType, ChatAction};
pub use routes::{build_router, RelayState, StatsResponse};
pub use session::{AccessPolicy, Outcome, SessionOrchestrator};
pub use telegram::TelegramChannel;
pub use traits::{Channel, ChannelError, ChannelResult, Transport};

use relay_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

/// Capacity of the queue between a channel listener and its processor.
const INBOUND_QUEUE: usize = 100;

/// A channel hooked up to its own orchestrator.
struct Wired {
    orchestrator: Arc<SessionOrchestrator>,
    listener: JoinHandle<()>,
    processor: JoinHandle<()>,
}

async fn wire<C>(channel: Arc<C>, backend: Arc<dyn Backend>, config: &Config) -> anyhow::Result<Wired>
where
    C: Channel + 'static,
{
    channel.init().await?;

    let orchestrator = Arc::new(SessionOrchestrator::from_config(
        channel.clone(),
        backend,
        config,
    ));

    let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
    let processor = orchestrator.clone().spawn_processor(rx);

    let listener = tokio::spawn(async move {
        if let Err(e) = channel.listen(tx).await {
            tracing::error!(channel = channel.name(), "Listener stopped: {e}");
        }
        if let Err(e) = channel.shutdown().await {
            tracing::warn!(channel = channel.name(), "Shutdown failed: {e}");
        }
    });

    Ok(Wired {
        orchestrator,
        listener,
        processor,
    })
}

/// Start every enabled channel and, if configured, the HTTP server.
///
/// Returns when all channels have closed or on Ctrl-C.
pub async fn start(config: &Config) -> anyhow::Result<()> {
    let backend: Arc<dyn Backend> = Arc::new(ChatGptBackend::from_config(&config.backend));

    let mut wired = Vec::new();
    if config.telegram.enabled {
        let token = config.telegram.bot_token.clone().unwrap_or_default();
        let telegram = TelegramChannel::new(token).with_poll_timeout(config.telegram.poll_timeout_secs);
        wired.push(wire(Arc::new(telegram), backend.clone(), config).await?);
        tracing::info!("Telegram channel enabled");
    }
    if config.cli.enabled {
        wired.push(wire(Arc::new(CliChannel::new()), backend.clone(), config).await?);
        tracing::info!("CLI channel enabled");
    }

    let server = if config.server.enabled {
        let addr = SocketAddr::from((
            config.server.host.parse::<std::net::IpAddr>()?,
            config.server.port,
        ));

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        let state = Arc::new(RelayState {
            orchestrators: wired.iter().map(|w| w.orchestrator.clone()).collect(),
        });
        let router = build_router(state).layer(cors);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Serving health routes on {}", addr);

        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("HTTP server failed: {e}");
            }
        }))
    } else {
        None
    };

    let (listeners, processors): (Vec<_>, Vec<_>) =
        wired.into_iter().map(|w| (w.listener, w.processor)).unzip();

    tokio::select! {
        _ = futures_util::future::join_all(processors) => {
            tracing::info!("All channels closed");
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutdown signal received");
        }
    }

    for listener in listeners {
        listener.abort();
    }
    if let Some(server) = server {
        server.abort();
    }

    Ok(())
}
