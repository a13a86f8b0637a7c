use clap::Parser;

mod analysis;
mod app;
mod auth;
mod cli;
mod config;
mod db;
mod error;
mod experiments;
mod state;

use crate::cli::{Cli, Commands, ServeArgs};
use crate::config::AdminConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "labnote=debug,axum=info,tower_http=info".to_string());
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

    let parsed = Cli::parse();
    match parsed.command.unwrap_or(Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => {
            let addr = args.addr()?;
            let app_state = AppState::init().await?;
            db::migrate(&app_state.db).await?;
            app::serve(app::build_app(app_state), addr).await?;
        }
        Commands::ListUsers => {
            let (db, _) = admin_pool().await?;
            for user in cli::list_users(&db).await? {
                println!("{}\t{}", user.id, user.username);
            }
        }
        Commands::ResetPassword(args) => {
            let (db, admin) = admin_pool().await?;
            let password = cli::read_password_from_stdin()?;
            let user_id =
                cli::reset_password(&db, admin.admin_key.as_deref(), &args, &password).await?;
            println!("password reset for user {user_id}");
        }
    }

    Ok(())
}

async fn admin_pool() -> anyhow::Result<(sqlx::SqlitePool, AdminConfig)> {
    let admin = AdminConfig::from_env();
    let db = db::connect(&admin.database.url, admin.database.max_connections).await?;
    db::migrate(&db).await?;
    Ok((db, admin))
}
