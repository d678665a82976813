/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: main.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-02 09:51:20
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-05 10:14:52
 */

mod archive;
mod catalog;
mod config;
mod dispatcher;
mod recipients;
mod smtp_sender;
mod traits;

use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::dispatcher::Dispatcher;
use crate::recipients::Recipients;
use clap::Parser;
use log::{error, info, warn};
use rustls::crypto;
use std::io::Write;
use std::path::PathBuf;

struct MultiWriter {
    writers: Vec<Box<dyn Write + Send + 'static>>,
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for w in &mut self.writers {
            let _ = w.write(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        for w in &mut self.writers {
            let _ = w.flush();
        }
        Ok(())
    }
}

/// Replays archived mails against an SMTP server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    config: Option<String>,

    /// Recipient address, repeat or comma separate for several
    #[arg(short, long = "to", value_delimiter = ',')]
    to: Vec<String>,

    /// Root of the archived message store
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Number of messages to replay, negative for all of them
    #[arg(short, long, allow_negative_numbers = true)]
    limit: Option<i64>,

    /// Send every message to all recipients at once
    #[arg(short, long)]
    broadcast: bool,
}

impl Args {
    // Command line values win over the configuration file
    fn apply(&self, config: &mut AppConfig) {
        if !self.to.is_empty() {
            config.recipients = self.to.clone();
        }
        if let Some(root) = &self.root {
            config.corpus.root = root.clone();
        }
        if let Some(limit) = self.limit {
            config.corpus.limit = limit;
        }
        if self.broadcast {
            config.broadcast = true;
        }
    }
}

fn initialize_logger(config: &AppConfig) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::new();

    if let Some(level) = &config.log_level {
        builder.parse_filters(level);
    } else if let Ok(env_level) = std::env::var("RUST_LOG") {
        builder.parse_filters(&env_level);
    } else {
        builder.filter_level(log::LevelFilter::Info);
    }

    if let Some(log_file) = &config.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|e| anyhow::anyhow!("Failed to open log file {}: {}", log_file, e))?;

        if config.quiet {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        } else {
            let multi_writer = MultiWriter {
                writers: vec![Box::new(file), Box::new(std::io::stderr())],
            };
            builder.target(env_logger::Target::Pipe(Box::new(multi_writer)));
        }
    } else if config.quiet {
        builder.target(env_logger::Target::Pipe(Box::new(std::io::sink())));
    }

    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = crypto::ring::default_provider().install_default();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::new_from_file(path),
        None => AppConfig::new(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Failed to load config: {:?}", e);
        if let Ok(path) = std::env::current_dir() {
            eprintln!("Current search path: {:?}", path);
        }
        eprintln!(
            "Please create a `config.yml` or `profile/application.yml`, set APP_... environment variables, or specify a config file with --config."
        );
        std::process::exit(1);
    });
    args.apply(&mut config);

    initialize_logger(&config)?;

    let recipients = Recipients::parse(&config.recipients)?;

    info!("Starting Mail Replayer...");
    info!(
        "Target server: {}:{} - Recipients: {} - Broadcast: {}",
        config.server.host,
        config.server.port,
        recipients.len(),
        config.broadcast
    );

    let catalog = Catalog::from_config(&config.corpus);
    info!("Scanning message store {}", catalog.root().display());
    let limit = config.corpus.limit();
    let sources = tokio::task::spawn_blocking(move || catalog.discover(limit)).await?;
    if sources.is_empty() {
        warn!("No mail to send under {}", config.corpus.root.display());
        return Ok(());
    }
    info!("Selected {} messages for replay", sources.len());

    let dispatcher = Dispatcher::new(config.server.clone(), &config.dispatch)?;
    let report = dispatcher
        .send_all(&recipients, &sources, config.broadcast)
        .await;

    info!(
        "Replay finished in {:.1}s: {} sent, {} failed, {} connection recycles",
        report.elapsed.as_secs_f64(),
        report.succeeded(),
        report.failed(),
        report.recycles
    );
    if report.failed() > 0 {
        error!("{} of {} mails were not delivered", report.failed(), report.outcomes.len());
    }

    Ok(())
}
