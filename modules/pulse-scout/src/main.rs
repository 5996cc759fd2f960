use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pulse_common::Config;
use pulse_scout::controller::RunController;
use pulse_scout::pipeline::{Pipeline, RunOutcome, NOTHING_FOUND_MESSAGE};
use pulse_scout::report::CsvReportSink;
use pulse_scout::traits::BrowserPage;
use pulse_scout::webdriver_page::WebDriverPage;
use sentiment_client::SentimentClient;

#[derive(Parser)]
#[command(
    name = "pulse-scout",
    about = "Harvest a post's comments and report their sentiment"
)]
struct Cli {
    /// Path to config TOML file
    #[arg(long, default_value = "./config/pulse.toml")]
    config: PathBuf,

    /// Post URL. Prompted for when omitted.
    #[arg(long)]
    url: Option<String>,

    /// Stop after this many comments
    #[arg(long)]
    target: Option<usize>,

    /// Where to write the CSV report
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pulse=info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(target) = cli.target {
        config.harvest.target_count = target;
    }
    if let Some(path) = cli.report {
        config.report.path = path;
    }
    config.validate()?;
    config.log_summary();

    let url = match cli.url {
        Some(url) => url,
        None => prompt_url()?,
    };
    if url.is_empty() {
        bail!("No post URL given");
    }

    let model = SentimentClient::new(
        &config.classifier.model,
        config.inference_token.as_deref(),
        config.classifier.request_timeout(),
    )?
    .with_base_url(&config.classifier.base_url);
    let sink = CsvReportSink::new(&config.report.path);
    let controller = RunController::new(config.progress.buffer);

    // Kept so the window can be closed if the run never starts; once started,
    // the worker closes it.
    let page = Arc::new(WebDriverPage::open(&config.browser).await?);
    let started = Pipeline::from_config(
        &config,
        Box::new(page.clone()),
        Arc::new(model),
        Box::new(sink),
    )
    .and_then(|pipeline| controller.start(pipeline, url));
    let mut handle = match started {
        Ok(handle) => handle,
        Err(e) => {
            if let Err(close_err) = page.close().await {
                warn!(error = %close_err, "Failed to close browser");
            }
            return Err(e.into());
        }
    };

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    while let Some(update) = handle.progress.recv().await {
        println!("[{}] {}", update.phase, update.message);
    }

    match handle.finish().await? {
        RunOutcome::Completed(report) => {
            println!("\n{}", report.summary);
            println!("Report saved to {}", report.location);
            info!("{}", report.stats);
        }
        RunOutcome::NothingFound { stats, .. } => {
            println!("{NOTHING_FOUND_MESSAGE}");
            info!("{stats}");
        }
    }

    Ok(())
}

fn prompt_url() -> Result<String> {
    print!("Post URL: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Failed to read post URL from stdin")?;
    Ok(line.trim().to_string())
}
