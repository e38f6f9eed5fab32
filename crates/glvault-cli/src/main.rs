//! `glvault` CLI — command-line client for the `glvault` server.
//!
//! A thin HTTP client: every subcommand maps directly onto one admin
//! endpoint. No cryptographic or storage logic lives here.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const DIM: &str = "\x1b[2m";

/// glvault — manage API-key credentials and inspect relay audit history.
#[derive(Parser)]
#[command(
    name = "glvault",
    version,
    about = "glvault CLI — manage vaulted API keys and relay audit history",
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         GLVAULT_ADDR           Server address (default: http://127.0.0.1:8200)\n  \
         GLVAULT_ADMIN_TOKEN    Admin bearer token\n\n\
         {DIM}Examples:{RESET}\n  \
         glvault register weather APIKEY1 https://api.openweathermap.org --quota-limit 1000\n  \
         glvault list\n  \
         glvault audit weather --limit 20"
    )
)]
struct Cli {
    /// glvault server address.
    #[arg(long, env = "GLVAULT_ADDR", default_value = "http://127.0.0.1:8200")]
    addr: String,

    /// Admin bearer token.
    #[arg(long, env = "GLVAULT_ADMIN_TOKEN")]
    admin_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new credential under an alias.
    Register {
        alias: String,
        api_key: String,
        base_url: String,
        #[arg(long)]
        quota_limit: Option<u64>,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Rotate the credential stored under an alias.
    Rotate { alias: String, new_api_key: String },
    /// List every registered alias's metadata.
    List,
    /// Query audit history and stats for an alias.
    Audit {
        alias: String,
        #[arg(long)]
        since: Option<i64>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Remove a credential and its alias.
    Remove { alias: String },
    /// Check server health, unauthenticated.
    Health,
}

struct Client {
    http: reqwest::Client,
    addr: String,
    admin_token: Option<String>,
}

impl Client {
    fn new(addr: String, admin_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            addr,
            admin_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.addr)
    }

    fn bearer(&self) -> Result<&str> {
        self.admin_token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no admin token provided — set GLVAULT_ADMIN_TOKEN or use --admin-token"))
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let token = self.bearer()?;
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    async fn get_no_auth(&self, path: &str) -> Result<Value> {
        let resp = self.http.get(self.url(path)).send().await.context("request failed")?;
        handle_response(resp).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let token = self.bearer()?;
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        let token = self.bearer()?;
        let resp = self
            .http
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let body = resp.text().await.context("failed to read response body")?;
    if !status.is_success() {
        bail!("server returned {status}: {body}");
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).context("failed to parse response JSON")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let client = Client::new(cli.addr, cli.admin_token);

    match run(client, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{RED}{BOLD}error:{RESET} {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(client: Client, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Register {
            alias,
            api_key,
            base_url,
            quota_limit,
            owner,
        } => cmd_register(&client, &alias, &api_key, &base_url, quota_limit, owner).await,
        Commands::Rotate { alias, new_api_key } => cmd_rotate(&client, &alias, &new_api_key).await,
        Commands::List => cmd_list(&client).await,
        Commands::Audit { alias, since, limit } => cmd_audit(&client, &alias, since, limit).await,
        Commands::Remove { alias } => cmd_remove(&client, &alias).await,
        Commands::Health => cmd_health(&client).await,
    }
}

async fn cmd_register(
    client: &Client,
    alias: &str,
    api_key: &str,
    base_url: &str,
    quota_limit: Option<u64>,
    owner: Option<String>,
) -> Result<()> {
    let body = json!({
        "alias": alias,
        "api_key": api_key,
        "base_url": base_url,
        "quota_limit": quota_limit,
        "owner": owner,
    });
    let resp = client.post("/keys/register", &body).await?;
    println!("{GREEN}registered{RESET} {alias}");
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}

async fn cmd_rotate(client: &Client, alias: &str, new_api_key: &str) -> Result<()> {
    let body = json!({"alias": alias, "new_api_key": new_api_key});
    let resp = client.post("/keys/rotate", &body).await?;
    println!("{GREEN}rotated{RESET} {alias}");
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}

async fn cmd_list(client: &Client) -> Result<()> {
    let resp = client.get("/keys/list").await?;
    let count = resp.get("count").and_then(Value::as_u64).unwrap_or(0);
    println!("{BOLD}{count} registered alias(es){RESET}");
    if let Some(keys) = resp.get("keys").and_then(Value::as_array) {
        for key in keys {
            let alias = key.get("alias").and_then(Value::as_str).unwrap_or("?");
            let base_url = key.get("base_url").and_then(Value::as_str).unwrap_or("?");
            let used = key.get("quota_used").and_then(Value::as_u64).unwrap_or(0);
            let limit = key.get("quota_limit").and_then(Value::as_u64).unwrap_or(0);
            println!("  {alias:<24} {base_url:<40} quota {used}/{limit}");
        }
    }
    Ok(())
}

async fn cmd_audit(client: &Client, alias: &str, since: Option<i64>, limit: Option<usize>) -> Result<()> {
    let mut path = format!("/keys/audit?alias={alias}");
    if let Some(since) = since {
        path.push_str(&format!("&since={since}"));
    }
    if let Some(limit) = limit {
        path.push_str(&format!("&limit={limit}"));
    }
    let resp = client.get(&path).await?;
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}

async fn cmd_remove(client: &Client, alias: &str) -> Result<()> {
    let resp = client.delete(&format!("/keys/{alias}")).await?;
    println!("{GREEN}removed{RESET} {alias}");
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}

async fn cmd_health(client: &Client) -> Result<()> {
    let resp = client.get_no_auth("/health").await?;
    println!("{}", serde_json::to_string_pretty(&resp)?);
    Ok(())
}
