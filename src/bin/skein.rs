//! Binary entry point: parse CLI args, init logging, resolve the application, run the listener.

use std::sync::Arc;

use skein::app::Application;
use skein::config::ServerConfig;
use skein::debug::DebugWrap;
use skein::limits::ServerLimits;
use skein::listener::Listener;
use skein::{logging, registry};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    logging::init();

    let config = ServerConfig::from_args();

    let app = match registry::resolve(&config.target) {
        Ok(app) => app,
        Err(err) => {
            tracing::error!(error = %err, "failed to resolve application target");
            std::process::exit(1);
        }
    };

    let app: Arc<dyn Application> = if config.debug {
        Arc::new(DebugWrap::new(app))
    } else {
        app
    };

    let listener = Listener::new(config, ServerLimits::new(), app);
    listener.run().await
}
