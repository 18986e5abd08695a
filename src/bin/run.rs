// Start the controller
use kube::Client;
use runnerset_controller::{telemetry, Config};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let client = Client::try_default().await?;
    let config = Config::from_env();
    runnerset_controller::run(client, config).await;
    Ok(())
}
