use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "kernel-cli")]
#[command(about = "Ops CLI for the resilience kernel", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "KERNEL_OPS_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check kernel status
    Status,
    /// Source stats, breaker stats, cache stats, alerts and recommendations
    Summary,
    /// List every circuit breaker
    Breakers,
    /// Force a breaker closed, or every breaker with --all
    Reset {
        name: Option<String>,
        #[arg(long, conflicts_with = "name")]
        all: bool,
    },
    /// Inspect cache size
    Cache,
    /// Remove expired cache entries
    ClearExpired {
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the newest metric records
    Recent {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Drop all collected metrics
    ClearMetrics,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path) = match cli.command {
        Commands::Status => (Method::GET, "/ops/status".to_string()),
        Commands::Summary => (Method::GET, "/ops/summary".to_string()),
        Commands::Breakers => (Method::GET, "/ops/breakers".to_string()),
        Commands::Reset { all: true, .. } => (Method::POST, "/ops/breakers/reset".to_string()),
        Commands::Reset { name: Some(name), .. } => {
            (Method::POST, format!("/ops/breakers/{}/reset", name))
        }
        Commands::Reset { name: None, .. } => {
            eprintln!("Error: pass a breaker name or --all");
            std::process::exit(2);
        }
        Commands::Cache => (Method::GET, "/ops/cache".to_string()),
        Commands::ClearExpired { dry_run } => (
            Method::POST,
            format!("/ops/cache/clear-expired?dry_run={}", dry_run),
        ),
        Commands::Recent { limit } => (Method::GET, format!("/ops/metrics/recent?limit={}", limit)),
        Commands::ClearMetrics => (Method::POST, "/ops/metrics/clear".to_string()),
    };

    let res = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: ops API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let body = res.text().await?;
    if body.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&body)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
