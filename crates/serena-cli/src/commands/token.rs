// `serena token` and `serena secret`: the HS256 secret the server verifies
// bearer tokens with, and tokens signed by it for local testing.

use chrono::{Duration, Utc};
use clap::Args;
use colored::Colorize;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serena_axum::JwtAuthenticator;
use serena_core::Principal;

const SECRET_LEN: usize = 48;

#[derive(Args)]
pub struct TokenArgs {
    /// Subject (user id) of the token
    #[arg(long)]
    user_id: String,

    #[arg(long)]
    email: Option<String>,

    /// HS256 secret shared with the server
    #[arg(long, env = "SERENA_JWT_SECRET", hide_env_values = true)]
    secret: String,

    /// Lifetime in hours
    #[arg(long, default_value_t = 24)]
    ttl_hours: i64,
}

pub fn run(args: TokenArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut principal = Principal::new(args.user_id);
    if let Some(email) = args.email {
        principal = principal.with_email(email);
    }

    let expires_at = Utc::now() + Duration::hours(args.ttl_hours);
    let token = JwtAuthenticator::new(&args.secret).issue(&principal, expires_at)?;

    eprintln!(
        "{} token for {} expires {}",
        "●".cyan(),
        principal.user_id.bold(),
        expires_at.to_rfc3339()
    );
    println!("{token}");
    Ok(())
}

/// Print a fresh `SERENA_JWT_SECRET` line.
pub fn run_secret() -> Result<(), Box<dyn std::error::Error>> {
    let secret = generate_secret();
    eprintln!("{} add to the server environment, then sign tokens with `serena token`", "●".cyan());
    println!("SERENA_JWT_SECRET={secret}");
    Ok(())
}

fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}
