// `serena sign-webhook`: produce a signature header for a payload, for
// replaying events against a local server with curl.

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use serena_billing::webhook::{sign_payload, SIGNATURE_HEADER};

#[derive(Args)]
pub struct SignWebhookArgs {
    /// Webhook signing secret
    #[arg(long, env = "STRIPE_WEBHOOK_SECRET", hide_env_values = true)]
    secret: String,

    /// Payload as a literal string
    #[arg(long, conflicts_with = "file")]
    payload: Option<String>,

    /// Read the payload from a file
    #[arg(long)]
    file: Option<PathBuf>,

    /// Unix timestamp to sign with. Defaults to now.
    #[arg(long)]
    timestamp: Option<i64>,
}

pub fn run(args: SignWebhookArgs) -> Result<(), Box<dyn std::error::Error>> {
    let payload = match (&args.payload, &args.file) {
        (Some(raw), _) => raw.clone().into_bytes(),
        (None, Some(path)) => std::fs::read(path)?,
        (None, None) => return Err("Pass --payload or --file.".into()),
    };

    if serde_json::from_slice::<serde_json::Value>(&payload).is_err() {
        eprintln!("{} payload is not valid JSON", "warning:".yellow());
    }

    let timestamp = args.timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp());
    let header = sign_payload(&payload, &args.secret, timestamp)?;

    println!("{SIGNATURE_HEADER}: {header}");
    Ok(())
}
