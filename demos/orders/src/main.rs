//! Orders Demo
//!
//! An order-processing consumer wired against the in-process broker.
//!
//! # Routing Tree
//!
//! ```text
//! <root>
//! ├── audit                     every message
//! ├── orders
//! │   ├── :id.created           parses the order body,
//! │   │                         then recovers rejected orders
//! │   └── :id.cancelled         ends the response and exits
//! ├── inventory.*               restock notices
//! └── (error handler)           logs whatever is left
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package orders-demo -- --count 5
//! ```

use std::path::PathBuf;

use anyhow::Result;
use brook::prelude::*;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(about = "Consume a batch of demo orders")]
struct Args {
    /// Configuration file. Defaults to the brook.toml next to this demo.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile (development, production, ...).
    #[arg(short, long)]
    profile: Option<String>,

    /// Number of orders to publish.
    #[arg(short = 'n', long, default_value_t = 3)]
    count: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Order {
    sku: String,
    quantity: u32,
}

// ============================================================================
// Handler Functions
// ============================================================================

async fn audit(req: Request) {
    info!(topic = req.topic(), offset = ?req.offset(), "received");
}

async fn order_created(req: Request) -> Result<Next, HandlerError> {
    let order: Order = req.body_as()?;
    if order.quantity == 0 {
        return Ok(Next::error(format!("order for {} has no items", order.sku)));
    }

    let id = req.param("id").unwrap_or_default();
    info!(%id, sku = %order.sku, quantity = order.quantity, "order created");
    Ok(Next::Continue)
}

async fn order_cancelled(req: Request, res: Response) -> Result<Next, HandlerError> {
    let id = req.param("id").unwrap_or_default();
    info!(%id, "order cancelled");
    res.end()?;
    Ok(Next::Exit)
}

async fn rejected(err: HandlerError, req: Request, _res: Response) -> Next {
    warn!(topic = req.topic(), error = %err, "order rejected");
    Next::Handled
}

async fn restock(req: Request) {
    let item = req.param("0").unwrap_or_default();
    info!(%item, "restock notice");
}

async fn fallback(err: HandlerError, req: Request, _res: Response) -> Next {
    error!(topic = req.topic(), error = %err, "unhandled");
    Next::Handled
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn publish_demo_orders(broker: &MemoryBroker, count: u32) -> Result<()> {
    for i in 0..count {
        let order = Order {
            sku: format!("sku-{i}"),
            quantity: i % 3,
        };
        broker.publish(
            InboundMessage::new(format!("orders.{i}.created"))
                .with_key(i.to_string())
                .with_json(&order)?,
        )?;
    }
    broker.publish(InboundMessage::new("orders.0.cancelled"))?;
    broker.publish(InboundMessage::new("inventory.sku-1"))?;
    broker.publish(InboundMessage::new("unrouted.topic"))?;
    broker.close();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = match &args.config {
        Some(path) => ConfigLoader::new().file(path),
        None => ConfigLoader::new().search_path(env!("CARGO_MANIFEST_DIR")),
    };
    if let Some(profile) = &args.profile {
        loader = loader.profile(profile);
    }
    let config = loader.load()?;
    init_from_config(&config.logging);

    let broker = MemoryBroker::new();
    let mut app = Application::new().bind(broker.clone());

    app.use_handler(audit);
    app.mount(
        Router::new("orders")?
            .nest(
                Router::new(":id.created")?
                    .handler(order_created)
                    .handler(rejected),
            )?
            .nest(Router::new(":id.cancelled")?.handler(order_cancelled))?,
    )?;
    app.route("inventory.*", restock)?;
    app.use_handler(fallback);

    info!(topics = ?app.paths(), "routing tree ready");

    publish_demo_orders(&broker, args.count)?;
    app.run(&config.client, &config.consumer).await?;

    let failed = broker
        .completions()
        .iter()
        .filter(|(_, done)| !done.is_success())
        .count();
    info!(total = broker.completions().len(), failed, "done");
    Ok(())
}
