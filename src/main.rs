use accounts::{
    app,
    cli::{Cli, Commands},
    state::AppState,
    users::services,
};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "accounts=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let app_state = AppState::init().await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => app::serve(app_state).await?,
        Commands::CreateSuperuser {
            username,
            email,
            password,
        } => {
            let user = services::create_superuser(app_state.store.as_ref(), username, email, password)
                .await?;
            println!("created superuser {} ({})", user.username, user.id);
        }
        Commands::Promote { email } => {
            let user = services::promote(app_state.store.as_ref(), &email).await?;
            println!("promoted {} ({})", user.username, user.id);
        }
    }

    Ok(())
}
