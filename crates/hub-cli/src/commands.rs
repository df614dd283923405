use std::path::Path;

use anyhow::{bail, Context as _};
use colored::Colorize;
use hub_app::config::CONFIG_FILE;
use hub_app::{AppConfig, GenesisFileState, HubApp};
use hub_types::abci::{RequestBeginBlock, RequestEndBlock, RequestInitChain};
use hub_types::BlockHeader;

use crate::cli::*;

/// Timestamp of the genesis block in replayed chains.
const GENESIS_TIME: u64 = 0;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Init(args) => cmd_init(&cli.home, args),
        Command::Export(args) => cmd_export(&cli.home, args, cli.format),
        Command::Run(args) => cmd_run(&cli.home, args, cli.format),
        Command::Version => cmd_version(cli.format),
    }
}

fn cmd_init(home: &Path, args: InitArgs) -> anyhow::Result<()> {
    std::fs::create_dir_all(home).with_context(|| format!("cannot create {}", home.display()))?;
    let mut config = AppConfig {
        home: home.to_path_buf(),
        ..AppConfig::default()
    };
    if let Some(chain_id) = args.chain_id {
        config.chain_id = chain_id;
    }
    config.validate()?;

    let config_path = home.join(CONFIG_FILE);
    let genesis_path = config.genesis_path();
    for path in [&config_path, &genesis_path] {
        if path.exists() && !args.overwrite {
            bail!("{} already exists (pass --overwrite to replace it)", path.display());
        }
    }
    config.save(&config_path)?;
    GenesisFileState::default().save(&genesis_path)?;

    println!(
        "{} Initialized node for {} in {}",
        "✓".green().bold(),
        config.chain_id.yellow(),
        home.display().to_string().bold()
    );
    println!("  Config:  {}", config_path.display());
    println!("  Genesis: {}", genesis_path.display());
    Ok(())
}

/// Load config and genesis, then run `init_chain`.
fn boot(home: &Path) -> anyhow::Result<(AppConfig, HubApp)> {
    let config = AppConfig::load_or_default(home)?;
    let genesis_path = config.genesis_path();
    let genesis = GenesisFileState::load(&genesis_path)?;
    let mut app = HubApp::from_config(&config)?;
    let res = app.init_chain(&RequestInitChain {
        time: GENESIS_TIME,
        chain_id: config.chain_id.clone(),
        validators: Vec::new(),
        app_state_bytes: genesis.to_json()?,
    })?;
    tracing::info!(
        genesis = %genesis_path.display(),
        validators = res.validators.len(),
        "genesis applied"
    );
    Ok((config, app))
}

/// Run empty blocks `from..=to`, returning the last app hash.
fn run_blocks(app: &mut HubApp, from: u64, to: u64, block_time: u64) -> anyhow::Result<Vec<u8>> {
    let mut app_hash = app.last_app_hash().to_vec();
    for height in from..=to {
        let header = BlockHeader {
            chain_id: app.chain_id().to_string(),
            height,
            time: GENESIS_TIME + height * block_time,
            proposer: None,
        };
        app.begin_block(&RequestBeginBlock {
            header,
            ..RequestBeginBlock::default()
        })?;
        let end = app.end_block(&RequestEndBlock { height })?;
        if !end.validator_updates.is_empty() {
            tracing::info!(height, updates = end.validator_updates.len(), "validator updates");
        }
        app_hash = app.commit()?.data;
    }
    Ok(app_hash)
}

fn cmd_run(home: &Path, args: RunArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (config, mut app) = boot(home)?;
    let halt_height = args.halt_height.unwrap_or(config.halt_height);
    if halt_height == 0 {
        bail!("no halt height: set halt_height in {CONFIG_FILE} or pass --halt-height");
    }
    let app_hash = run_blocks(&mut app, 1, halt_height, args.block_time)?;

    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "chain_id": app.chain_id(),
                "height": app.last_height(),
                "app_hash": hex::encode(&app_hash),
                "protocol": app.current_protocol(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!(
                "{} Halted at height {}",
                "✓".green().bold(),
                app.last_height().to_string().bold()
            );
            println!("  App hash: {}", hex::encode(&app_hash).cyan());
        }
    }
    Ok(())
}

fn cmd_export(home: &Path, args: ExportArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (_, mut app) = boot(home)?;
    if args.height > 0 {
        run_blocks(&mut app, 1, args.height, 5)?;
    }
    let exported = app.export_genesis()?;
    let json = exported.to_json()?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, &json).with_context(|| format!("cannot write {}", path.display()))?;
            if format == OutputFormat::Text {
                println!(
                    "{} Exported state at height {} to {}",
                    "✓".green().bold(),
                    app.last_height(),
                    path.display()
                );
            }
        }
        None => println!("{}", String::from_utf8_lossy(&json)),
    }
    Ok(())
}

fn cmd_version(format: OutputFormat) -> anyhow::Result<()> {
    let app = HubApp::new(AppConfig::default().chain_id)?;
    let versions: Vec<u64> = app.engine().versions().collect();
    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "hubd": env!("CARGO_PKG_VERSION"),
                "protocol_versions": versions,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!("hubd {}", env!("CARGO_PKG_VERSION").bold());
            for v in versions {
                println!("  protocol v{v}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init(home: &Path) {
        cmd_init(
            home,
            InitArgs {
                chain_id: Some("hub-test".into()),
                overwrite: false,
            },
        )
        .unwrap();
    }

    #[test]
    fn init_writes_config_and_genesis() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path());
        let config = AppConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.chain_id, "hub-test");
        assert_eq!(
            GenesisFileState::load(&config.genesis_path()).unwrap(),
            GenesisFileState::default()
        );
    }

    #[test]
    fn init_refuses_to_clobber() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path());
        let again = cmd_init(
            dir.path(),
            InitArgs {
                chain_id: None,
                overwrite: false,
            },
        );
        assert!(again.is_err());
    }

    #[test]
    fn replay_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path());
        let (_, mut first) = boot(dir.path()).unwrap();
        let (_, mut second) = boot(dir.path()).unwrap();
        let a = run_blocks(&mut first, 1, 4, 5).unwrap();
        let b = run_blocks(&mut second, 1, 4, 5).unwrap();
        assert_eq!(a, b);
        assert_eq!(first.last_height(), 4);
    }

    #[test]
    fn run_without_halt_height_fails() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path());
        let res = cmd_run(
            dir.path(),
            RunArgs {
                halt_height: None,
                block_time: 5,
            },
            OutputFormat::Text,
        );
        assert!(res.is_err());
    }

    #[test]
    fn malformed_genesis_halts_boot() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path());
        std::fs::write(dir.path().join("genesis.json"), "{ broken").unwrap();
        assert!(boot(dir.path()).is_err());
    }
}
