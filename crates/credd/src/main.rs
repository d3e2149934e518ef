use std::io::BufRead;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "credd", about = "credd — username/password credential service", version)]
struct Cli {
    /// credd server URL (default: http://localhost:8000 or $CREDD_SERVER)
    #[arg(long, env = "CREDD_SERVER", default_value = "http://localhost:8000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the credd HTTP server
    Serve {
        /// Port to listen on (default: $CREDD_PORT or 8000)
        #[arg(long, env = "CREDD_PORT", default_value = "8000")]
        port: u16,
        /// Host to bind (default: $CREDD_HOST or 0.0.0.0)
        #[arg(long, env = "CREDD_HOST", default_value = "0.0.0.0")]
        host: String,
    },
    /// Register a new user. Password from $CREDD_PASSWORD or the first line of stdin
    Register {
        username: String,
    },
    /// Check a username/password pair. Password from $CREDD_PASSWORD or stdin
    Login {
        username: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CREDD_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(host, port).await,
        Commands::Register { username } => {
            let password = read_password()?;
            cmd_register(&cli.server, &username, &password).await
        }
        Commands::Login { username } => {
            let password = read_password()?;
            cmd_login(&cli.server, &username, &password).await
        }
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16) -> Result<()> {
    let cfg = credd_server::ServerConfig {
        host,
        port,
        ..Default::default()
    };
    credd_server::run(cfg).await
}

async fn cmd_register(server: &str, username: &str, password: &str) -> Result<()> {
    let json = post_credentials(server, "register", username, password).await?;
    let user_id = json["user_id"].as_str().unwrap_or("");
    println!("✓ registered {username} ({user_id})");
    Ok(())
}

async fn cmd_login(server: &str, username: &str, password: &str) -> Result<()> {
    post_credentials(server, "login", username, password).await?;
    println!("✓ credentials accepted for {username}");
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn post_credentials(
    server: &str,
    endpoint: &str,
    username: &str,
    password: &str,
) -> Result<Value> {
    let client = Client::new();
    let body = Zeroizing::new(
        serde_json::json!({
            "username": username,
            "password": password,
        })
        .to_string(),
    );

    let resp = client
        .post(format!("{}/{endpoint}", server.trim_end_matches('/')))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body.as_bytes().to_vec())
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.unwrap_or_default();
    if !status.is_success() {
        let detail = json["detail"].as_str().unwrap_or("unknown error");
        anyhow::bail!("server returned {status}: {detail}");
    }
    Ok(json)
}

fn read_password() -> Result<Zeroizing<String>> {
    password_from(std::env::var("CREDD_PASSWORD").ok(), std::io::stdin().lock())
}

/// `$CREDD_PASSWORD` wins, else the first line of `input` without its line
/// ending. Empty is a valid password, as it is for the server. Only input that
/// ends before any line is an error.
fn password_from(env: Option<String>, mut input: impl BufRead) -> Result<Zeroizing<String>> {
    if let Some(p) = env {
        return Ok(Zeroizing::new(p));
    }
    let mut line = Zeroizing::new(String::new());
    let read = input
        .read_line(&mut line)
        .context("read password from stdin")?;
    if read == 0 {
        anyhow::bail!("no password given: set CREDD_PASSWORD or pipe it on stdin");
    }
    let password = line.strip_suffix('\n').unwrap_or(&line);
    let password = password.strip_suffix('\r').unwrap_or(password);
    Ok(Zeroizing::new(password.to_owned()))
}
