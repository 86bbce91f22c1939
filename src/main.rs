use std::sync::Arc;

use authsync::config::{load_config, print_schema};
use authsync::startup;
use authsync::utils::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::args().any(|arg| arg == "--schema") {
        print_schema();
        return Ok(());
    }

    let config = load_config();
    init_logging(&config.logging)?;

    startup::run(Arc::new(config)).await
}
