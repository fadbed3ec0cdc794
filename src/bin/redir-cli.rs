use clap::{Parser, Subcommand};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "redir-cli")]
#[command(about = "Management CLI for the redirector control API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:10101", env = "REDIR_URL")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every rule with its hit count
    List,
    /// Show one rule
    Get {
        service: String,
    },
    /// Create or replace a rule
    Set {
        service: String,
        /// Location template, e.g. 'https://golang.org{{.URL.Path}}'
        template: String,
    },
    /// Remove a rule
    Remove {
        service: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::List => client.get(format!("{}/api/", base)).send().await?,
        Commands::Get { service } => client.get(format!("{}/api/{}", base, service)).send().await?,
        Commands::Set { service, template } => {
            client
                .post(format!("{}/api/", base))
                .header(CONTENT_TYPE, "application/json")
                .body(json!({ "url": service, "template": template }).to_string())
                .send()
                .await?
        }
        Commands::Remove { service } => client.delete(format!("{}/api/{}", base, service)).send().await?,
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: control API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text.trim_end());
        }
        std::process::exit(1);
    }

    if status == reqwest::StatusCode::NO_CONTENT {
        println!("ok");
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
