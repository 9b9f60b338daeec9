// `serena migrate`: apply the billing schema, check it, or print it.

use clap::{Args, Subcommand};
use colored::Colorize;
use serena_billing::schema::schema_sql;
use serena_sqlx::migration::missing_tables;
use serena_sqlx::SqlxStore;

#[derive(Args)]
pub struct MigrateArgs {
    /// Database URL (`sqlite:...` or `postgres://...`)
    #[arg(long, env = "SERENA_DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    action: Option<MigrateAction>,
}

#[derive(Subcommand)]
pub enum MigrateAction {
    /// Apply the schema (default)
    Run,
    /// List required tables that do not exist yet
    Status,
    /// Print the schema SQL without connecting
    Print,
}

pub fn run(args: MigrateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let action = args.action.unwrap_or(MigrateAction::Run);
    if let MigrateAction::Print = action {
        println!("{}", schema_sql());
        return Ok(());
    }

    let url = args
        .database_url
        .ok_or("No database configured. Pass --database-url or set SERENA_DATABASE_URL.")?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let store = SqlxStore::connect(&url).await?;
        match action {
            MigrateAction::Status => {
                let missing = missing_tables(store.pool(), store.kind()).await?;
                if missing.is_empty() {
                    println!("{} Schema is up to date", "✓".green());
                } else {
                    println!("{} Missing tables:", "●".yellow());
                    for table in missing {
                        println!("  {} {}", "→".magenta(), table.yellow());
                    }
                }
            }
            _ => {
                let applied = store.migrate().await?;
                println!("{} Applied {} schema statements", "✓".green(), applied);
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
