//! Administrative CLI for kennel.

mod api_client;

use anyhow::{Context, Result};
use api_client::{ApiClient, PruneReport, PruneRequest};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Format, Toml};
use futures::StreamExt;
use kennel_core::DogId;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Parser)]
#[command(name = "kennelctl")]
#[command(about = "Administrative CLI for kennel")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ClientConfigArgs {
    /// Client config file path
    #[arg(long, env = "KENNEL_CLIENT_CONFIG")]
    client_config: Option<String>,
}

#[derive(Args, Clone)]
struct ApiArgs {
    /// Server API URL (overrides client config)
    #[arg(long)]
    server: Option<String>,

    /// Admin token (overrides client config)
    #[arg(long)]
    token: Option<String>,

    #[command(flatten)]
    client: ClientConfigArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Save server URL and token to the client config
    Login {
        /// Server API base URL (e.g., https://portal.example.org)
        url: String,
        /// Token value (avoid if possible; prefer --token-stdin)
        #[arg(long)]
        token: Option<String>,
        /// Read token from stdin
        #[arg(long, default_value_t = false)]
        token_stdin: bool,
        #[command(flatten)]
        client: ClientConfigArgs,
    },
    /// Check server health and version
    Health {
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Find storage objects no record references, and optionally delete them
    Prune {
        /// Delete orphans instead of reporting them
        #[arg(long, default_value_t = false)]
        live: bool,
        /// Examine at most this many objects (0 = all)
        #[arg(long)]
        limit: Option<u64>,
        /// Paths per bulk delete call
        #[arg(long)]
        batch_size: Option<i64>,
        /// Print the raw JSON report
        #[arg(long, default_value_t = false)]
        json: bool,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Download a dog's records and media as a .tar.gz archive
    Export {
        /// Dog ID (canonical UUID form)
        dog_id: String,
        /// Output file (default: name suggested by the server)
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Hash a token for the server's [admin] config section
    HashToken {
        /// Token value (avoid if possible; prefer --token-stdin)
        #[arg(long)]
        token: Option<String>,
        /// Read token from stdin
        #[arg(long, default_value_t = false)]
        token_stdin: bool,
    },
}

/// Client-side configuration file.
#[derive(Debug, Default, Deserialize, Serialize)]
struct ClientConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli { command } = Cli::parse();

    match command {
        Commands::Login {
            url,
            token,
            token_stdin,
            client,
        } => handle_login_command(&url, token, token_stdin, &client).await,
        Commands::Health { api } => handle_health_command(&api).await,
        Commands::Prune {
            live,
            limit,
            batch_size,
            json,
            api,
        } => {
            let request = PruneRequest {
                dry_run: !live,
                limit,
                batch_size,
            };
            handle_prune_command(request, json, &api).await
        }
        Commands::Export {
            dog_id,
            output,
            api,
        } => handle_export_command(&dog_id, output, &api).await,
        Commands::HashToken { token, token_stdin } => {
            let token = read_token(token, token_stdin)?;
            print!("{}", render_token_hash(&token));
            Ok(())
        }
    }
}

async fn resolve_api_config(api: &ApiArgs) -> Result<(String, String)> {
    match (&api.server, &api.token) {
        (Some(server), Some(token)) => return Ok((server.clone(), token.clone())),
        (Some(_), None) | (None, Some(_)) => {
            anyhow::bail!("missing paired flag: use both --server and --token");
        }
        (None, None) => {}
    }

    let server_env = std::env::var("KENNEL_SERVER").ok();
    let token_env = std::env::var("KENNEL_TOKEN").ok();

    match (server_env, token_env) {
        (Some(server), Some(token)) => return Ok((server, token)),
        (Some(_), None) | (None, Some(_)) => {
            anyhow::bail!("missing paired env var: set both KENNEL_SERVER and KENNEL_TOKEN");
        }
        (None, None) => {}
    }

    let config_path = client_config_path(api.client.client_config.as_deref())?;
    let config = load_client_config(&config_path).await?;

    match (config.server, config.token) {
        (Some(server), Some(token)) => Ok((server, token)),
        _ => anyhow::bail!(
            "no server configured: pass --server and --token, or run `kennelctl login` (config: {})",
            config_path.display()
        ),
    }
}

async fn get_api_client(api: &ApiArgs) -> Result<ApiClient> {
    let (server, token) = resolve_api_config(api).await?;
    let base_url = normalize_base_url(&server)?;
    ApiClient::new(&base_url, &token)
}

async fn handle_login_command(
    url: &str,
    token: Option<String>,
    token_stdin: bool,
    client: &ClientConfigArgs,
) -> Result<()> {
    let base_url = normalize_base_url(url)?;
    let token = read_token(token, token_stdin)?;

    // Confirm the server answers before saving anything.
    let health = ApiClient::new(&base_url, &token)?
        .health()
        .await
        .with_context(|| format!("failed to reach {base_url}"))?;

    let path = client_config_path(client.client_config.as_deref())?;
    let config = ClientConfig {
        server: Some(base_url.clone()),
        token: Some(token),
    };
    save_client_config(&path, &config).await?;

    println!("Logged in to {base_url} (server {})", health.version);
    println!("Config written to: {}", path.display());
    Ok(())
}

async fn handle_health_command(api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api).await?;
    let health = client.health().await?;

    println!("Status: {}", health.status);
    println!("Server version: {}", health.version);
    if let Some(backend) = &health.storage_backend {
        println!("Storage backend: {backend}");
    }
    println!("Client version: {}", env!("CARGO_PKG_VERSION"));

    if health.version != env!("CARGO_PKG_VERSION") {
        eprintln!(
            "Warning: version mismatch (server: {}, client: {})",
            health.version,
            env!("CARGO_PKG_VERSION")
        );
    }
    Ok(())
}

async fn handle_prune_command(request: PruneRequest, json: bool, api: &ApiArgs) -> Result<()> {
    let client = get_api_client(api).await?;
    let report = client.prune(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_prune_report(&report));
    }

    let failed = report.error_total();
    if failed > 0 {
        anyhow::bail!("{failed} orphan deletions failed");
    }
    Ok(())
}

fn render_prune_report(report: &PruneReport) -> String {
    let mut out = String::new();
    let mode = if report.dry_run { "dry run" } else { "live" };
    let _ = writeln!(out, "Prune ({mode})");
    let _ = writeln!(out, "  Examined objects: {}", report.examined_objects);
    let _ = writeln!(out, "  Referenced objects: {}", report.referenced_objects);
    let _ = writeln!(out, "  Orphaned objects: {}", report.orphan_total());
    for (bucket, count) in &report.orphaned_objects {
        let _ = writeln!(out, "    {bucket}: {count}");
    }

    if let Some(samples) = &report.sample_orphans {
        if samples.values().any(|paths| !paths.is_empty()) {
            let _ = writeln!(out, "  Sample orphans:");
            for (bucket, paths) in samples {
                for path in paths {
                    let _ = writeln!(out, "    {bucket}/{path}");
                }
            }
        }
    }

    if let Some(results) = &report.results {
        let attempted: u64 = results.iter().map(|r| r.attempted).sum();
        let _ = writeln!(out, "  Deleted: {} of {}", report.deleted_total(), attempted);
        for result in results {
            for error in &result.errors {
                let _ = writeln!(
                    out,
                    "    failed {}/{}: {}",
                    result.bucket, error.path, error.message
                );
            }
        }
    }

    if report.truncated {
        let _ = writeln!(
            out,
            "  Note: scan was truncated by --limit; run again to cover the rest"
        );
    }
    out
}

async fn handle_export_command(
    dog_id: &str,
    output: Option<PathBuf>,
    api: &ApiArgs,
) -> Result<()> {
    let dog_id = DogId::parse_strict(dog_id.trim()).context("invalid dog ID")?;
    let client = get_api_client(api).await?;
    let response = client.export_dog(&dog_id.to_string()).await?;

    let output = output.unwrap_or_else(|| {
        let suggested = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(disposition_filename);
        PathBuf::from(suggested.unwrap_or_else(|| format!("{dog_id}.tar.gz")))
    });

    let partial = partial_path(&output);
    let written = match write_body(response, &partial).await {
        Ok(written) => written,
        Err(err) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err);
        }
    };
    tokio::fs::rename(&partial, &output)
        .await
        .with_context(|| format!("failed to move archive to {}", output.display()))?;

    tracing::debug!(dog_id = %dog_id, bytes = written, "Export downloaded");
    println!("Wrote {written} bytes to {}", output.display());
    Ok(())
}

async fn write_body(response: reqwest::Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("export stream interrupted")?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Extract `filename` from a Content-Disposition value.
///
/// Only the bare file name is kept so a server cannot direct the write
/// outside the working directory.
fn disposition_filename(value: &str) -> Option<String> {
    let raw = value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))?;
    let name = raw.trim_matches('"');
    let name = Path::new(name).file_name()?.to_str()?;
    if name.is_empty() || name.starts_with('.') {
        return None;
    }
    Some(name.to_string())
}

fn render_token_hash(token: &str) -> String {
    let token_hash = kennel_core::hash_token(token);
    format!("sha256:{token_hash}\n\nAdd to server.toml:\n  [admin]\n  token_hash = \"sha256:{token_hash}\"\n")
}

fn client_config_path(explicit: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(PathBuf::from(path));
    }

    if let Some(path) = std::env::var_os("KENNEL_CLIENT_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(path) => PathBuf::from(path),
        None => {
            let home = std::env::var_os("HOME")
                .ok_or_else(|| anyhow::anyhow!("HOME not set; set KENNEL_CLIENT_CONFIG"))?;
            PathBuf::from(home).join(".config")
        }
    };

    Ok(base.join("kennel").join("client.toml"))
}

async fn load_client_config(path: &Path) -> Result<ClientConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }

    match figment.extract() {
        Ok(config) => Ok(config),
        Err(_) if !path.exists() => Ok(ClientConfig::default()),
        Err(err) => Err(anyhow::anyhow!(err).context("failed to load client configuration")),
    }
}

async fn save_client_config(path: &Path, config: &ClientConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let contents = toml::to_string_pretty(config)?;

    tokio::fs::write(path, contents).await?;

    // Set restrictive permissions (0600) since the file contains tokens
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }

    Ok(())
}

fn read_token(token: Option<String>, token_stdin: bool) -> Result<String> {
    if let Some(token) = token {
        return Ok(token);
    }
    if token_stdin {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        let token = buf.trim().to_string();
        if token.is_empty() {
            anyhow::bail!("token read from stdin is empty");
        }
        return Ok(token);
    }
    anyhow::bail!("token required: use --token or --token-stdin");
}

fn normalize_base_url(url: &str) -> Result<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("server URL must start with http:// or https://");
    }
    Ok(url.trim_end_matches('/').to_string())
}
