use clap::Parser;
use hub_app::AppConfig;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let directive = cli.log_level.clone().unwrap_or_else(|| {
        AppConfig::load_or_default(&cli.home)
            .map(|c| c.log_level)
            .unwrap_or_else(|_| AppConfig::default().log_level)
    });
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = commands::run_command(cli) {
        tracing::error!(error = %err, "hubd halted");
        return Err(err);
    }
    Ok(())
}
