use rust_actix_web_todolist::{config::Config, server, telemetry};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let app_name = std::env::var("CARGO_BIN_NAME").unwrap_or("todolist".to_string());
    telemetry::init(&app_name)?;

    let config = Config::new()?;
    server::run(config).await?;
    Ok(())
}
