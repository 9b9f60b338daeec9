use clap::{Parser, Subcommand};

mod commands;

/// Serena CLI: run and operate the billing service
#[derive(Parser)]
#[command(name = "serena", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve(commands::serve::ServeArgs),

    /// Apply or print the database schema
    Migrate(commands::migrate::MigrateArgs),

    /// Show the limits of every subscription tier
    Tiers,

    /// Sign a webhook payload the way the billing provider does
    SignWebhook(commands::sign::SignWebhookArgs),

    /// Generate a random secret for SERENA_JWT_SECRET
    Secret,

    /// Issue a bearer token for local testing
    Token(commands::token::TokenArgs),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::run(args),
        Commands::Migrate(args) => commands::migrate::run(args),
        Commands::Tiers => commands::tiers::run(),
        Commands::SignWebhook(args) => commands::sign::run(args),
        Commands::Secret => commands::token::run_secret(),
        Commands::Token(args) => commands::token::run(args),
    };

    if let Err(e) = result {
        eprintln!("{} {}", colored::Colorize::red("error:"), e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_sign_webhook() {
        let cli = Cli::try_parse_from([
            "serena",
            "sign-webhook",
            "--secret",
            "whsec_x",
            "--payload",
            "{}",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::SignWebhook(_)));
    }
}
