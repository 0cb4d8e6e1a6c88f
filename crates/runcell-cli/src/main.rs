use anyhow::{bail, Context, Result};
use clap::Parser;
use futures_util::{pin_mut, StreamExt};
use log::LevelFilter;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use runcell_core::{
    adapter_for, DockerEngine, OutputEvent, ProcessDriver, RuncellConfig, Session,
    SessionContainer,
};

#[derive(Parser, Debug)]
#[clap(
    name = "runcell",
    author,
    version = "0.1.0",
    about = "Sandboxed, session-oriented code execution"
)]
struct Cli {
    /// Code file to execute; stdin is read when neither this nor --code is given
    file: Option<PathBuf>,

    #[clap(long, short, help = "Inline code snippet to execute")]
    code: Option<String>,

    #[clap(long, short, default_value = "shell", help = "Language of the snippet")]
    language: String,

    #[clap(long, help = "Run inside an isolated, reusable container")]
    contain: bool,

    #[clap(
        long,
        help = "Session identifier; the same session reuses its container and workspace"
    )]
    session: Option<String>,

    #[clap(long, help = "Configuration file (YAML)")]
    config: Option<PathBuf>,

    #[clap(long, default_value = "info")]
    log_level: String,

    #[clap(
        long,
        help = "Stop the session container and delete its workspace before exiting"
    )]
    teardown: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = cli
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);
    env_logger::Builder::new().filter_level(level).init();

    let config = match &cli.config {
        Some(path) => RuncellConfig::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => RuncellConfig::default(),
    };

    let adapter = adapter_for(&cli.language)?;
    let code = read_code(&cli)?;

    if cli.contain {
        run_contained(&cli, config, adapter, &code).await
    } else {
        let mut driver = ProcessDriver::local(adapter, config.driver.clone());
        emit_events(&mut driver, &code).await;
        driver.shutdown().await;
        Ok(())
    }
}

fn read_code(cli: &Cli) -> Result<String> {
    if let Some(code) = &cli.code {
        return Ok(code.clone());
    }
    if let Some(path) = &cli.file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()));
    }
    let mut code = String::new();
    std::io::stdin()
        .read_to_string(&mut code)
        .context("reading code from stdin")?;
    if code.trim().is_empty() {
        bail!("no code given: pass a file, --code, or pipe code to stdin");
    }
    Ok(code)
}

async fn run_contained(
    cli: &Cli,
    config: RuncellConfig,
    adapter: Arc<dyn runcell_core::LanguageAdapter>,
    code: &str,
) -> Result<()> {
    let engine =
        Arc::new(DockerEngine::connect(&config.container).context("connecting to the container engine")?);

    let sessions_root = config.container.sessions_root();
    let session = match &cli.session {
        Some(id) => Session::named(id.clone(), &sessions_root),
        None => Session::generate(&sessions_root),
    };
    log::info!("using session {}", session.id());

    let mut driver = ProcessDriver::containerized(
        engine.clone(),
        session.clone(),
        config.container.clone(),
        adapter,
        config.driver.clone(),
    );
    emit_events(&mut driver, code).await;
    driver.shutdown().await;

    if cli.teardown {
        SessionContainer::new(engine, config.container)
            .teardown(&session)
            .await
            .context("tearing down the session")?;
        log::info!("session {} torn down", session.id());
    }
    Ok(())
}

async fn emit_events(driver: &mut ProcessDriver, code: &str) {
    let stream = driver.run(code);
    pin_mut!(stream);
    while let Some(event) = stream.next().await {
        match event {
            OutputEvent::Output { output } => println!("{}", output),
            OutputEvent::ActiveLine {
                active_line: Some(line),
            } => log::debug!("active line: {}", line),
            OutputEvent::ActiveLine { active_line: None } => log::debug!("execution finished"),
        }
    }
}
