// ABOUTME: provides a user-facing cli for sending operations to the workspace daemon.
// ABOUTME: prints deterministic json responses returned by the daemon.

use clap::{Parser, Subcommand};

use wardsh::{load_payload, validate_payload, Op};

#[derive(Debug, Parser)]
#[command(name = "wardsh")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate a payload locally, then send it to the daemon.
    Send {
        #[arg(long, value_enum)]
        op: Op,

        #[arg(long, default_value = "http://127.0.0.1:3001")]
        server: String,

        #[arg(long)]
        file: Option<String>,

        #[arg(long)]
        json: Option<String>,
    },
    /// Validate a payload locally without sending it.
    Validate {
        #[arg(long, value_enum)]
        op: Op,

        #[arg(long)]
        file: Option<String>,

        #[arg(long)]
        json: Option<String>,
    },
    /// Fetch the daemon's health inventory.
    Health {
        #[arg(long, default_value = "http://127.0.0.1:3001")]
        server: String,
    },
    /// List the bundled project templates.
    Templates {
        #[arg(long, default_value = "http://127.0.0.1:3001")]
        server: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Send {
            op,
            server,
            file,
            json,
        } => {
            let payload = load_payload(file.as_deref(), json.as_deref())?;
            let verdict = validate_payload(op, &payload);
            if !verdict.ok {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
                std::process::exit(1);
            }

            let response = reqwest::Client::new()
                .post(format!("{}{}", server, op.endpoint()))
                .json(&payload)
                .send()
                .await?;
            let status = response.status();
            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            if !status.is_success() {
                std::process::exit(1);
            }
        }
        Command::Validate { op, file, json } => {
            let payload = load_payload(file.as_deref(), json.as_deref())?;
            let verdict = validate_payload(op, &payload);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            if !verdict.ok {
                std::process::exit(1);
            }
        }
        Command::Health { server } => {
            let body: serde_json::Value = reqwest::get(format!("{server}/system/health"))
                .await?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Templates { server } => {
            let body: serde_json::Value = reqwest::get(format!("{server}/templates"))
                .await?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}
