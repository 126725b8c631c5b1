use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use hive::config::Config;
use hive::http::request::Method;
use hive::http::response::StatusCode;
use hive::pool::{PoolOptions, ServerPool, gateway};
use hive::server::{Dispatcher, System, handler, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let dispatcher = Dispatcher::new();
    let options = PoolOptions {
        port_policy: cfg.pool.port_policy,
        server: cfg.server.clone(),
    };

    let pool = Arc::new(ServerPool::create_with(
        dispatcher.clone(),
        cfg.pool.gateway_port,
        &cfg.pool.gateway_resource,
        gateway::redirect(),
        cfg.pool.members,
        &options,
    )?);

    pool.add_route("/hello", router::welcome())?;
    pool.add_route(
        "/upload",
        handler(|ctx, req, res| {
            if !req.is_method(Method::POST) {
                res.end(StatusCode::MethodNotAllowed);
                return;
            }
            let mut fields: Vec<_> = req.form_data.iter().collect();
            fields.sort();
            let listing: String = fields
                .into_iter()
                .map(|(name, value)| format!("{}={}\n", name, value))
                .collect();
            res.content_type("text/plain")
                .body(format!("served by {}\n{}", ctx.port(), listing));
        }),
    )?;

    let events = {
        let pool = pool.clone();
        let mut rx = dispatcher.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        pool.handle_event(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    let system = Arc::new(System::new("hive", dispatcher));
    pool.start(system, router::not_found()).await?;

    let mut summary = Vec::new();
    pool.print(&mut summary)?;
    tracing::info!("\n{}", String::from_utf8_lossy(&summary));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    pool.shutdown().await?;
    pool.dispose().await?;
    events.abort();

    Ok(())
}
