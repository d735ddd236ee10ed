use anyhow::Result;
use std::env;
use std::io;
use std::process;

use l10n_applier::{
    apply_localization, logging, write_report, Config, L10nError, LocalizationRequest, SqlitePlatform,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();

    let (config_path, request) = match LocalizationRequest::from_args(&args) {
        Ok(parsed) => parsed,
        Err(err @ L10nError::Usage) => {
            println!("{}", err);
            process::exit(err.exit_code());
        }
        Err(err) => return Err(err.into()),
    };

    // Loaded once; everything below reads from this value
    let config = Config::load(&config_path)?;
    logging::init(config.log_level());

    println!("🌍 Applying localization to database '{}'", request.db_name);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let platform = SqlitePlatform::from_config(&config);
    let report = apply_localization(&platform, &request)?;
    write_report(&mut io::stdout().lock(), &request, &report)?;

    Ok(())
}
