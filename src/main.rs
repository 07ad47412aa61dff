use anyhow::Result;
use clap::Parser;
use std::sync::Arc;

use storefront_client::client::ApiClient;
use storefront_client::config::{CliArgs, Command, Config};
use storefront_client::error::ApiError;
use storefront_client::session::SessionStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    let config = Config::from_args(&args)?;

    // Initialize logging with the configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let session = Arc::new(match config.session_file.clone() {
        Some(path) => SessionStore::open(path)?,
        None => SessionStore::new(),
    });

    let client = ApiClient::new(&config, session.clone())?;

    match args.command {
        Command::Login { username } => {
            let username = match username {
                Some(name) => name,
                None => dialoguer::Input::new()
                    .with_prompt("Username")
                    .interact_text()?,
            };
            let password: String = dialoguer::Password::new()
                .with_prompt("Password")
                .interact()?;

            match client.login(&username, &password).await {
                Ok(user) => println!("Logged in as {}", user.username),
                Err(e) => fail(e),
            }
        }

        Command::Logout => {
            client.logout().await;
            println!("Logged out");
        }

        Command::Whoami => {
            let snapshot = session.snapshot().await;
            match snapshot.user {
                Some(user) if snapshot.authenticated => {
                    println!("Logged in as {}", user.username);
                    if let Some(expires_at) = snapshot.expires_at {
                        println!("Access token expires at {}", expires_at.to_rfc3339());
                    }
                }
                _ => println!("Not logged in"),
            }
            if let Some(error) = snapshot.error {
                println!("Last auth error: {}", error);
            }
        }

        Command::Get { path } => {
            match client.get_json::<serde_json::Value>(&path).await {
                Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
                Err(e) => fail(e),
            }
        }
    }

    Ok(())
}

/// Print a user-facing message for an API error and exit non-zero
fn fail(err: ApiError) -> ! {
    match &err {
        ApiError::Unauthenticated(_) | ApiError::RefreshFailed(_) => {
            eprintln!("Session expired, please log in again ({})", err);
        }
        ApiError::Network(_) => {
            eprintln!("Network problem, try again later ({})", err);
        }
        _ => eprintln!("Request failed: {}", err),
    }
    std::process::exit(1);
}
