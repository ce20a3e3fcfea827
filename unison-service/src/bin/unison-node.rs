#[path = "unison-node/cli.rs"]
mod cli;
#[path = "unison-node/setup.rs"]
mod setup;

use crate::cli::Cli;
use log::{info, warn};
use std::sync::Arc;
use unison_core::foundation::now_nanos;
use unison_service::service::{run_node, ServiceFlow};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse_args();
    args.apply_to_env();

    let app_config = setup::load_app_config(args.profile.as_deref())?;
    setup::init_logging(&app_config, args.log_level.as_deref())?;
    info!("unison-node starting profile={}", args.profile.as_deref().unwrap_or("-"));

    let store = setup::init_store(&app_config)?;
    let state = setup::init_state(&app_config)?;
    let identity = setup::init_identity(&app_config)?;
    let transport = setup::init_transport(&app_config, store.clone(), &identity);
    let catalog = setup::init_catalog(&app_config, &identity.peer_id);
    setup::log_startup_banner(&app_config, &identity.peer_id);

    let flow = Arc::new(ServiceFlow::new(app_config, transport, store, state, catalog, now_nanos())?);
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("ctrl_c listener failed error={}", err);
            std::future::pending::<()>().await;
        }
    };
    run_node(flow, shutdown).await?;
    info!("unison-node stopped");
    Ok(())
}
