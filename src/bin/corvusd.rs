//! Process entry point: reads the config file, initializes logging, starts
//! the bot, and waits for either stdin to close with every session
//! stopped, or an interrupt/terminate signal.

use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;

use corvus::{Bot, Config};

fn init_logging(config: &Config) {
    let level = log::LevelFilter::from_str(&config.log_level).unwrap_or(log::LevelFilter::Info);
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Some(path) = &config.log_file {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("corvusd: failed to open log file {path:?}: {e}"),
        }
    }
    builder.init();
}

fn read_config(path: &str) -> anyhow::Result<Config> {
    let text = std::fs::read_to_string(path)?;
    Ok(Config::from_toml_str(&text)?)
}

/// Spawns a blocking task that reads stdin to EOF, then notifies `tx`.
/// A closed stdin is one half of the process's exit condition.
fn watch_stdin_close() -> tokio::sync::oneshot::Receiver<()> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        let mut buf = [0u8; 256];
        let mut stdin = std::io::stdin();
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        let _ = tx.send(());
    });
    rx
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "corvus.toml".to_owned());
    let config = read_config(&path)?;
    init_logging(&config);

    let bot = Arc::new(Bot::new(config)?);
    bot.start();
    log::info!("corvus started, config={path:?}");

    let mut stdin_rx = watch_stdin_close();
    let mut stdin_closed = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("received interrupt, shutting down");
                break;
            }
            result = &mut stdin_rx, if !stdin_closed => {
                stdin_closed = result.is_ok();
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(200)), if stdin_closed => {
                if bot.all_networks_stopped() {
                    log::info!("stdin closed with no active sessions, shutting down");
                    break;
                }
            }
        }
    }

    bot.stop();
    bot.join().await;
    Ok(())
}
