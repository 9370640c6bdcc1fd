use owui_syncd::daemon::{DaemonConfig, DaemonRuntime};
use owui_syncd::logging;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Run,
    Once,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Run;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--once" => mode = CliMode::Once,
            "--help" | "-h" => mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let mode = parse_cli_mode(std::env::args())?;
    if mode == CliMode::Help {
        println!("Usage: owui-syncd [--once]");
        println!("  --once   Run a single reconciliation cycle and exit");
        return Ok(());
    }

    logging::init(&logging::log_file_from_env());
    let config = DaemonConfig::from_env()?;
    let mut daemon = DaemonRuntime::bootstrap(config).await?;
    match mode {
        CliMode::Once => {
            daemon.run_once().await;
            Ok(())
        }
        _ => daemon.run().await,
    }
}
