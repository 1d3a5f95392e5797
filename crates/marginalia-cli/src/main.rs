use anyhow::{Context, Result};
use marginalia_config::Config;
use std::{env, path::PathBuf, process};

mod replay;

use replay::{Replay, Script};

fn usage(program: &str) -> ! {
    eprintln!("Usage: {program} <document.md> <script.toml> [--config <config.toml>]");
    process::exit(1);
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("marginalia-cli");

    let (document_path, script_path, config_path) = match args.as_slice() {
        [_, document, script] => (PathBuf::from(document), PathBuf::from(script), None),
        [_, document, script, flag, config] if flag == "--config" => (
            PathBuf::from(document),
            PathBuf::from(script),
            Some(PathBuf::from(config)),
        ),
        _ => usage(program),
    };

    // Config decides the default log level, so it is read before logging starts
    let config = match &config_path {
        Some(path) => Config::load_from_path(path)?
            .with_context(|| format!("Config file {} not found", path.display()))?,
        None => Config::load()?,
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str()))
        .init();

    log::info!(
        "Replaying {} against {}",
        script_path.display(),
        document_path.display()
    );

    let markdown = std::fs::read_to_string(&document_path)
        .with_context(|| format!("Failed to read document {}", document_path.display()))?;
    let script = Script::load(&script_path)?;

    let mut replay = Replay::new(&markdown, config, script.cursor)?;
    if let Err(e) = replay.run_all(&script.actions) {
        // Show how far the session got before the failing action
        eprintln!("{}", replay.transcript().join("\n"));
        eprintln!("Error: {e:#}");
        process::exit(1);
    }

    log::info!("Finished at document version {}", replay.state().version());
    print!("{}", replay.report());
    Ok(())
}
