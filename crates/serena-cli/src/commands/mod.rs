pub mod migrate;
pub mod serve;
pub mod sign;
pub mod tiers;
pub mod token;

use std::path::Path;

use serena_core::SerenaOptions;

/// Load options from `--config` when given, otherwise from the environment.
pub(crate) fn load_options(config: Option<&Path>) -> Result<SerenaOptions, Box<dyn std::error::Error>> {
    let options = match config {
        Some(path) => SerenaOptions::from_file(path)?,
        None => SerenaOptions::from_env()?,
    };
    Ok(options)
}
