use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "micro-api-cli")]
#[command(about = "Command-line client for the message API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:9000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the current message
    Message,
    /// Replace the message
    Configure {
        /// New message text
        message: String,
    },
    /// Liveness ping
    Ping,
    /// Liveness probe
    Live,
    /// Readiness probe
    Ready,
    /// Dump Prometheus metrics
    Metrics,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Message => client.get(format!("{base}/message")).send().await?,
        Commands::Configure { message } => {
            client
                .put(format!("{base}/configuration"))
                .json(&json!({ "message": message }))
                .send()
                .await?
        }
        Commands::Ping => client.get(format!("{base}/ping")).send().await?,
        Commands::Live => client.get(format!("{base}/health/live")).send().await?,
        Commands::Ready => client.get(format!("{base}/health/ready")).send().await?,
        Commands::Metrics => {
            let res = client.get(format!("{base}/metrics")).send().await?;
            print!("{}", res.text().await?);
            return Ok(());
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: API returned status {}", status);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if !text.is_empty() => println!("{}", text),
        Err(_) => {}
    }
    Ok(())
}
