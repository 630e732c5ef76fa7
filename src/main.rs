use clap::{Parser, Subcommand};
use daily_stoic::config::Config;
use daily_stoic::db::QuoteStorage;
use daily_stoic::pipeline::{
    GeminiImageRenderer, GeminiInsightGenerator, ImageOverlay, Pipeline, TelegramPublisher,
    TextOverlay, compose_caption, preview,
};
use daily_stoic::scheduler::Scheduler;
use daily_stoic::service::{QuoteRepository, ingest_quotes, parse_quotes_file};
use mimalloc::MiMalloc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "daily-stoic", version, about = "Posts an illustrated Stoic quote every day")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Post daily at POST_TIME (UTC) until interrupted
    Run {
        /// Post once right away before waiting for the first trigger
        #[arg(long)]
        now: bool,
    },
    /// Post one quote now and exit
    Post,
    /// Import quotes from a CSV file with a quote_text,author[,source] header
    Ingest {
        csv: PathBuf,
        /// Start a new rotation cycle before importing
        #[arg(long)]
        reset: bool,
    },
    /// Show rotation counts
    Status,
    /// Start a new rotation cycle
    Reset,
    /// Generate an explanation and image for a quote without posting
    Preview {
        #[arg(long)]
        quote: String,
        #[arg(long, default_value = "Unknown")]
        author: String,
        /// Image destination; defaults to preview.<ext> in the working directory
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let cfg = Config::load()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        post_time = %cfg.post_time,
        text_model = %cfg.text_model,
        image_model = %cfg.image_model,
        proxy = %cfg.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        overlay_text = cfg.overlay_text,
        loglevel = %cfg.loglevel,
    );

    match cli.command {
        Command::Run { now } => {
            let pipeline = build_pipeline(&cfg).await?;
            let mut scheduler = Scheduler::new(pipeline, cfg.post_time()?);
            scheduler
                .run_until(now, async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!(error = %e, "failed to listen for ctrl-c");
                        std::future::pending::<()>().await;
                    }
                })
                .await;
        }
        Command::Post => {
            let pipeline = build_pipeline(&cfg).await?;
            let report = pipeline.run_once().await.inspect_err(|e| {
                error!(error = %e, "post failed");
            })?;
            println!(
                "posted quote {} as message {}{}",
                report.quote_id,
                report.message_id,
                if report.cycle_reset { " (new cycle)" } else { "" }
            );
        }
        Command::Ingest { csv, reset } => {
            let store = QuoteStorage::connect(&cfg.database_url).await?;
            if reset {
                let flipped = store.reset_cycle().await?;
                info!(flipped, "rotation reset before import");
            }
            let rows = parse_quotes_file(&csv)?;
            let report = ingest_quotes(&store, rows).await;
            let counts = store.counts().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
        Command::Status => {
            let store = QuoteStorage::connect(&cfg.database_url).await?;
            let counts = store.counts().await?;
            println!(
                "total: {}\nused: {}\nunused: {}",
                counts.total, counts.used, counts.unused
            );
            for quote in store.recently_used(5).await? {
                let when = quote
                    .last_used_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();
                println!("  {when}  #{} {}", quote.id, quote.author);
            }
        }
        Command::Reset => {
            let store = QuoteStorage::connect(&cfg.database_url).await?;
            let flipped = store.reset_cycle().await?;
            println!("reset {flipped} quotes; a new cycle starts with the next post");
        }
        Command::Preview { quote, author, out } => {
            let client = cfg.http_client()?;
            let insight = GeminiInsightGenerator::from_config(&cfg, client.clone())?;
            let renderer = GeminiImageRenderer::from_config(&cfg, client)?;
            let overlay = cfg.overlay_text.then(|| TextOverlay::from_config(&cfg)).transpose()?;

            let (generated, image) = preview(
                &insight,
                &renderer,
                overlay.as_ref().map(|o| o as &dyn ImageOverlay),
                &quote,
                &author,
            )
            .await?;
            let path =
                out.unwrap_or_else(|| PathBuf::from(format!("preview.{}", image.file_extension())));
            tokio::fs::write(&path, &image.bytes).await?;

            println!("{}\n", compose_caption(&generated.explanation, &quote, &author));
            println!("image prompt:\n{}\n", generated.image_prompt);
            println!("image written to {}", path.display());
        }
    }
    Ok(())
}

async fn build_pipeline(
    cfg: &Config,
) -> Result<Pipeline<QuoteStorage>, Box<dyn std::error::Error>> {
    cfg.require_credentials()?;
    let store = QuoteStorage::connect(&cfg.database_url).await?;
    let counts = store.counts().await?;
    if counts.total == 0 {
        warn!("quote store is empty; run `daily-stoic ingest <file.csv>` first");
    }
    info!(total = counts.total, unused = counts.unused, "quote store ready");

    let client = cfg.http_client()?;
    let publisher = TelegramPublisher::from_config(cfg, client.clone())?;
    if let Err(e) = publisher.verify().await {
        warn!(error = %e, "telegram token check failed; posting may not work");
    }

    let pipeline = Pipeline::new(
        store,
        Arc::new(GeminiInsightGenerator::from_config(cfg, client.clone())?),
        Arc::new(GeminiImageRenderer::from_config(cfg, client)?),
        Arc::new(publisher),
    );
    if !cfg.overlay_text {
        info!("text overlay disabled; posting images as rendered");
        return Ok(pipeline);
    }
    Ok(pipeline.with_overlay(Arc::new(TextOverlay::from_config(cfg)?)))
}
