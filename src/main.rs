use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use gwmon_service::cli::{Cli, Commands};
use gwmon_service::config::{Config, ENV_CONFIG_PATH};
use gwmon_service::ingest::usgs::NwisClient;
use gwmon_service::logging::{self, DataSource, LogLevel};
use gwmon_service::model::NwisError;
use gwmon_service::{locate, retrieve};

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose > 0 { LogLevel::Debug } else { LogLevel::Info };
    let log_file = cli.log_file.as_ref().map(|p| p.display().to_string());
    logging::init_logger(level, log_file.as_deref(), false);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logging::error(DataSource::System, None, &e.to_string());
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, NwisError> {
    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from));
    let mut config = Config::load(path.as_deref())?;
    config.apply_process_env()?;

    match &cli.command {
        Commands::FindSites(args) => args.apply(&mut config),
        Commands::GetLevels(args) => args.apply(&mut config),
        Commands::ShowConfig => {}
    }

    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli) -> Result<(), NwisError> {
    let config = load_config(cli)?;

    match &cli.command {
        Commands::FindSites(_) => {
            let client = NwisClient::new(&config.service.site_url, &config.service.gwlevels_url, config.timeout())?;
            let count = locate::run(&client, &config)?;
            println!(
                "Wrote {} sites with {} coordinates to {}",
                count,
                config.locator.datum,
                config.locator.output.display()
            );
        }
        Commands::GetLevels(args) => {
            let client = NwisClient::new(&config.service.site_url, &config.service.gwlevels_url, config.timeout())?;
            let summary = retrieve::run(&client, &config)?;
            if let Some(path) = &args.summary_json {
                summary.write_json(path)?;
            }
            println!("{}", summary.headline());
        }
        Commands::ShowConfig => {
            print!("{}", config.to_toml_string()?);
        }
    }

    Ok(())
}
