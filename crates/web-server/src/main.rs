// This main function is the entry point when running `cargo run -p web-server`.
// It loads settings from the environment and hands them to `run_server`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    configuration::telemetry::init_tracing()?;

    let settings = configuration::load_settings()?;
    web_server::run_server(settings).await
}
