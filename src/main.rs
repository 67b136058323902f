use anyhow::Result;
use gatehouse::Application;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting Gatehouse proxy");

    let app = Application::new()?;
    app.run().await?;

    Ok(())
}
