use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use reqwest::{multipart, Client, RequestBuilder, Response};
use shared_types::{ErrorResponse, UploadResponse, UserResponse};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "CLI for the artifact gateway")]
#[command(
    long_about = "A command-line interface for interacting with the artifact gateway.\n\n\
    Log in through the browser to obtain a token, then use it to inspect your\n\
    identity, upload a new version of the artifact, or download the current one."
)]
struct Cli {
    /// Gateway server URL to connect to.
    #[arg(
        short,
        long,
        default_value = "http://localhost:8000",
        env = "GATEWAY_URL"
    )]
    base_url: String,

    /// Bearer token issued by the gateway after login.
    ///
    /// Obtain one by opening the URL printed by `login-url` in a browser.
    #[arg(short, long, env = "GATEWAY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the URL that starts the browser login flow
    LoginUrl,

    /// Show the email the current token was issued to
    Whoami,

    /// Upload a new version of the artifact
    ///
    /// The previous version is kept on the server as a timestamped backup.
    Upload {
        /// Path of the file to upload.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Download the current artifact
    Fetch {
        /// Write to this file instead of stdout.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = cli.base_url.trim_end_matches('/');

    match cli.command {
        Commands::LoginUrl => {
            println!("Open this URL in a browser to log in:");
            println!("    {}/auth/login", base_url);
        }
        Commands::Whoami => {
            let token = require_token(cli.token.as_deref())?;
            let request = client.get(format!("{}/user", base_url)).bearer_auth(token);
            let user: UserResponse = send(request).await?.json().await?;
            println!("Logged in as {}", user.email);
        }
        Commands::Upload { path } => {
            let token = require_token(cli.token.as_deref())?;
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());

            let size = data.len();
            let form = multipart::Form::new()
                .part("file", multipart::Part::bytes(data).file_name(file_name));
            let request = client
                .post(format!("{}/artifact", base_url))
                .bearer_auth(token)
                .multipart(form);

            let uploaded: UploadResponse = send(request).await?.json().await?;
            println!("{} ({} bytes)", uploaded.message, size);
            if let Some(backup) = uploaded.backup {
                println!("    Previous version saved as {}", backup);
            }
        }
        Commands::Fetch { output } => {
            let token = require_token(cli.token.as_deref())?;
            let request = client
                .get(format!("{}/artifact", base_url))
                .bearer_auth(token);
            let bytes = send(request).await?.bytes().await?;

            match output {
                Some(path) => {
                    tokio::fs::write(&path, &bytes)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Saved {} bytes to {}", bytes.len(), path.display());
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&bytes)?;
                    stdout.flush()?;
                }
            }
        }
    }

    Ok(())
}

fn require_token(token: Option<&str>) -> anyhow::Result<&str> {
    match token {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => bail!("No token provided, pass --token or set GATEWAY_TOKEN"),
    }
}

/// Send a request and turn gateway error bodies into readable errors.
async fn send(request: RequestBuilder) -> anyhow::Result<Response> {
    let response = request.send().await.context("Failed to reach gateway")?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => bail!("Gateway returned {}: {}", status, err.error),
        Err(_) => bail!("Gateway returned {}", status),
    }
}
