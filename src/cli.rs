use std::io::BufRead;
use std::net::SocketAddr;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::auth::{
    handlers::is_valid_username,
    password::hash_password,
    repo_types::{User, UserId, UserSummary},
};

/// Lab notebook server and maintenance tools.
#[derive(Debug, Parser)]
#[command(name = "labnote", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP API (default).
    Serve(ServeArgs),
    /// Print id and username of every account.
    ListUsers,
    /// Overwrite a user's password. The new password is read from stdin.
    ResetPassword(ResetPasswordArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    /// Bind address; falls back to APP_HOST, then 0.0.0.0.
    #[arg(long)]
    pub host: Option<String>,
    /// Bind port; falls back to APP_PORT, then 8080.
    #[arg(long)]
    pub port: Option<u16>,
}

impl ServeArgs {
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        let host = match &self.host {
            Some(h) => h.clone(),
            None => std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        };
        let port = match self.port {
            Some(p) => p,
            None => match std::env::var("APP_PORT") {
                Ok(p) => p.parse().context("APP_PORT must be a port number")?,
                Err(_) => 8080,
            },
        };
        format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid bind address {host}:{port}"))
    }
}

#[derive(Debug, Clone, Args)]
pub struct ResetPasswordArgs {
    #[arg(long)]
    pub username: String,
    /// Must match LABNOTE_ADMIN_KEY.
    #[arg(long)]
    pub admin_key: String,
}

pub async fn list_users(db: &SqlitePool) -> anyhow::Result<Vec<UserSummary>> {
    Ok(User::list_all(db).await?)
}

/// Admin password reset, refused unless an admin key is configured and the
/// supplied one matches it.
pub async fn reset_password(
    db: &SqlitePool,
    configured_key: Option<&str>,
    args: &ResetPasswordArgs,
    new_password: &str,
) -> anyhow::Result<UserId> {
    let Some(expected) = configured_key else {
        bail!("LABNOTE_ADMIN_KEY is not set; password reset is disabled");
    };
    if expected != args.admin_key {
        warn!(username = %args.username, "password reset with wrong admin key");
        bail!("admin key mismatch");
    }
    if !is_valid_username(&args.username) {
        bail!("invalid username");
    }
    if new_password.len() < 8 {
        bail!("password too short");
    }

    let hash = hash_password(new_password)?;
    let user_id = User::reset_password(db, &args.username, &hash)
        .await
        .with_context(|| format!("reset password for {}", args.username))?;
    info!(user_id, "password reset");
    Ok(user_id)
}

pub fn read_password_from_stdin() -> anyhow::Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read new password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
