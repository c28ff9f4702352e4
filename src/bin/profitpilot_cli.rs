use std::{
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use profitpilot_api::{
    client::{ApiClient, ClientError},
    entities::{BillStatus, TransactionType},
    presentation::{
        render_bill_detail, render_bill_list, render_dashboard, render_deleted, render_download,
        render_upload, Dashboard, ViewState, DASHBOARD_PERIOD_DAYS, DASHBOARD_RECENT_BILLS,
    },
    storage::content_type_for_filename,
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "profitpilot", about = "Terminal dashboard for the ProfitPilot API")]
struct Cli {
    /// Base URL of the API
    #[arg(long, env = "PROFITPILOT_API_URL", default_value = "http://localhost:5000", global = true)]
    api_url: String,
    /// Access token from the identity provider
    #[arg(long, env = "PROFITPILOT_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Totals for the last year plus the most recent bills
    Dashboard {
        /// Your user id (the stats endpoint only answers for the caller)
        #[arg(long, env = "PROFITPILOT_USER_ID")]
        user_id: String,
    },
    /// List bills, newest first
    List {
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long, action = ArgAction::SetTrue)]
        include_items: bool,
    },
    /// Show one bill with its line items
    Show { id: Uuid },
    /// Upload an image or PDF for extraction
    Upload {
        path: PathBuf,
        /// purchase or sales
        #[arg(long, default_value = "purchase")]
        bill_type: String,
    },
    /// Save the stored file of a bill
    Download {
        id: Uuid,
        /// Directory or file path; defaults to the current directory
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Delete a bill and its items
    Delete { id: Uuid },
    /// Change the review status of a bill
    Status { id: Uuid, status: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let token = cli
        .token
        .clone()
        .context("an access token is required (--token or PROFITPILOT_TOKEN)")?;
    let client = ApiClient::new(reqwest::Client::new(), &cli.api_url, token);

    let ok = match cli.command {
        Commands::Dashboard { user_id } => {
            loading();
            let state = ViewState::from_result(
                async {
                    let stats = client.stats(&user_id, DASHBOARD_PERIOD_DAYS).await?;
                    let recent = client.list_bills(Some(DASHBOARD_RECENT_BILLS), false).await?;
                    Ok::<_, ClientError>(Dashboard { stats, recent })
                }
                .await,
            );
            if cli.json {
                show_json(&state, |d| &d.stats)?
            } else {
                show(&state, render_dashboard)
            }
        }
        Commands::List {
            limit,
            include_items,
        } => {
            loading();
            let state = ViewState::from_result(client.list_bills(limit, include_items).await);
            if cli.json {
                show_json(&state, |bills| bills)?
            } else {
                show(&state, |bills| render_bill_list(bills))
            }
        }
        Commands::Show { id } => {
            loading();
            let state = ViewState::from_result(client.get_bill(id).await);
            if cli.json {
                show_json(&state, |bill| bill)?
            } else {
                show(&state, render_bill_detail)
            }
        }
        Commands::Upload { path, bill_type } => {
            let bill_type = TransactionType::from_str(&bill_type)
                .map_err(|_| anyhow::anyhow!("bill type must be 'purchase' or 'sales'"))?;
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let content_type = content_type_for_filename(&file_name);

            eprintln!("Uploading {file_name}; extraction can take up to two minutes...");
            let state = ViewState::from_result(
                client
                    .upload(&file_name, content_type, bytes, bill_type)
                    .await,
            );
            if cli.json {
                show_json(&state, |r| r)?
            } else {
                show(&state, render_upload)
            }
        }
        Commands::Download { id, output } => {
            loading();
            let state = ViewState::from_result(client.download(id).await);
            match &state {
                ViewState::Ready(file) => {
                    let target = output_path(output.as_deref(), &file.filename);
                    std::fs::write(&target, &file.bytes)
                        .with_context(|| format!("failed to write {}", target.display()))?;
                    show(&state, |file| render_download(&target, file))
                }
                _ => show(&state, |_| String::new()),
            }
        }
        Commands::Delete { id } => {
            loading();
            let state = ViewState::from_result(client.delete(id).await);
            if cli.json {
                show_json(&state, |d| d)?
            } else {
                show(&state, render_deleted)
            }
        }
        Commands::Status { id, status } => {
            let status = BillStatus::from_str(&status).map_err(|_| {
                anyhow::anyhow!("status must be one of processed, reviewed, flagged, archived")
            })?;
            loading();
            let state = ViewState::from_result(client.update_status(id, status).await);
            if cli.json {
                show_json(&state, |bill| bill)?
            } else {
                show(&state, render_bill_detail)
            }
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn loading() {
    eprintln!("{}", ViewState::<()>::Loading.render_with(|_| String::new()));
}

/// Prints the settled view; returns whether it succeeded
fn show<T>(state: &ViewState<T>, render: impl FnOnce(&T) -> String) -> bool {
    let text = state.render_with(render);
    match state {
        ViewState::Ready(_) => {
            print!("{text}");
            let _ = std::io::stdout().flush();
            true
        }
        _ => {
            eprintln!("{text}");
            false
        }
    }
}

fn show_json<T, S: Serialize + ?Sized>(
    state: &ViewState<T>,
    select: impl FnOnce(&T) -> &S,
) -> Result<bool> {
    match state {
        ViewState::Ready(data) => {
            println!("{}", serde_json::to_string_pretty(select(data))?);
            Ok(true)
        }
        other => Ok(show(other, |_| String::new())),
    }
}

fn output_path(output: Option<&Path>, filename: &str) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(filename),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(filename),
    }
}
