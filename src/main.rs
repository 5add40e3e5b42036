mod ai;
mod app;
mod config;
mod db;
mod digest;
mod error;
mod models;
mod news;
mod retry;
mod store;

#[cfg(test)]
mod integration_tests;
#[cfg(test)]
mod testing;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use app::App;
use config::Config;
use error::{AppError, Result};
use models::{CategoryStatus, Digest, DigestOutcome, Frequency};

const WRAP_WIDTH: usize = 88;

/// A personal news digest: category queries, AI summaries, and a local
/// record of what you saved and rated.
#[derive(Parser)]
#[command(name = "news-digest", version, about)]
struct Cli {
    /// Config file (defaults to <config dir>/news-digest/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change interest categories and digest frequency.
    Prefs {
        /// Comma-separated categories, e.g. "Technology,Science".
        #[arg(long, value_delimiter = ',')]
        categories: Option<Vec<String>>,

        /// daily or weekly.
        #[arg(long)]
        frequency: Option<String>,
    },

    /// Fetch, summarize and print a digest.
    Digest {
        /// Try again on articles whose summary failed before.
        #[arg(long)]
        retry_failed: bool,

        /// Print the digest as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List saved articles.
    Saved,

    /// Save an article by id.
    Save { id: String },

    /// Remove an article from the saved list.
    Unsave { id: String },

    /// Rate an article from 1 to 5.
    Rate {
        id: String,
        score: u8,
        #[arg(long)]
        comment: Option<String>,
    },

    /// Print a shareable line for an article.
    Share { id: String },

    /// Discard an article's summary and generate a new one.
    Resummarize { id: String },

    /// Show usage statistics.
    Stats,

    /// Write preferences, saved articles, ratings and analytics to a JSON file.
    Export { path: PathBuf },

    /// Restore preferences, saved articles and ratings from an export file.
    Import { path: PathBuf },

    /// Clear saved articles, ratings and analytics. Preferences are kept.
    Reset {
        /// Required to confirm.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Warnings and errors only unless RUST_LOG says otherwise
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let app = App::new(config).await?;

    if let Err(e) = run(&app, cli.command).await {
        match e {
            AppError::Cancelled => eprintln!("Cancelled."),
            e => {
                tracing::error!("{}", e);
                eprintln!("Error: {}", e);
            }
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(app: &App, command: Commands) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    match command {
        Commands::Prefs {
            categories,
            frequency,
        } => {
            let frequency = frequency.map(|f| f.parse::<Frequency>()).transpose()?;
            let prefs = match (categories, frequency) {
                (None, None) => app.preferences().await?,
                (Some(categories), frequency) => app.update_preferences(&categories, frequency).await?,
                (None, frequency) => {
                    let current = app.preferences().await?;
                    app.update_preferences(&current.categories, frequency).await?
                }
            };
            println!("Categories: {}", display_list(&prefs.categories));
            println!("Frequency:  {}", prefs.frequency.as_str());
            println!("Available:  {}", app.category_names().join(", "));
        }

        Commands::Digest { retry_failed, json } => {
            let digest = app.generate_digest(retry_failed, &cancel).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&digest)?);
            } else {
                print_digest(&digest);
            }
        }

        Commands::Saved => {
            let saved = app.saved_articles().await?;
            if saved.is_empty() {
                println!("No saved articles.");
            }
            for (entry, article) in saved {
                match article {
                    Some(article) => println!(
                        "{}  {}  {}\n    {}",
                        entry.saved_at.format("%Y-%m-%d"),
                        article.id,
                        article.title,
                        article.url
                    ),
                    None => println!(
                        "{}  {}  (unknown article)",
                        entry.saved_at.format("%Y-%m-%d"),
                        entry.article_id
                    ),
                }
            }
        }

        Commands::Save { id } => {
            if app.save_article(&id).await? {
                println!("Saved.");
            } else {
                println!("Already saved.");
            }
        }

        Commands::Unsave { id } => {
            if app.remove_saved(&id).await? {
                println!("Removed.");
            } else {
                println!("Not in saved articles.");
            }
        }

        Commands::Rate { id, score, comment } => {
            app.rate_article(&id, score, comment).await?;
            println!("Rated {}/5.", score);
        }

        Commands::Share { id } => {
            println!("{}", app.share_article(&id).await?);
        }

        Commands::Resummarize { id } => {
            let article = app.resummarize(&id, &cancel).await?;
            println!("{}\n", article.title);
            println!("{}", wrap(article.display_text(), ""));
        }

        Commands::Stats => {
            let stats = app.stats().await?;
            println!("Saved articles:    {}", stats.total_saved_articles);
            println!("Ratings:           {}", stats.total_ratings);
            println!("Average rating:    {:.1}", stats.average_rating);
            println!("Cached articles:   {}", stats.cached_articles);
            println!(
                "Favorite category: {}",
                stats.favorite_category.as_deref().unwrap_or("-")
            );
            println!("Interests:         {}", display_list(&stats.interests));
            println!("Frequency:         {}", stats.frequency);
            println!(
                "Last activity:     {}",
                stats
                    .last_activity
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            println!("\nRatings by score:");
            for (score, count) in &stats.rating_distribution {
                println!("  {}: {}", score, count);
            }
            let sizes = &stats.data_sizes;
            println!("\nData on disk:");
            println!("  preferences     {:>9} B", sizes.preferences);
            println!("  saved articles  {:>9} B", sizes.saved_articles);
            println!("  ratings         {:>9} B", sizes.ratings);
            println!("  analytics       {:>9} B", sizes.analytics);
            println!("  article cache   {:>9} B", sizes.article_cache);
            println!("  total           {:>9} B", sizes.total());
        }

        Commands::Export { path } => {
            app.export(&path).await?;
            println!("Exported to {}", path.display());
        }

        Commands::Import { path } => {
            app.import(&path).await?;
            println!("Imported from {}", path.display());
        }

        Commands::Reset { yes } => {
            if !yes {
                println!("This clears saved articles, ratings and analytics. Re-run with --yes.");
                return Ok(());
            }
            app.reset().await?;
            println!("User data cleared.");
        }
    }

    Ok(())
}

fn print_digest(digest: &Digest) {
    match digest.outcome {
        DigestOutcome::Empty => {
            println!("No articles. Pick categories with `news-digest prefs --categories ...`.");
        }
        DigestOutcome::PartiallyStale => {
            println!("Some categories could not be refreshed; showing cached articles where possible.\n");
        }
        DigestOutcome::Fresh => {}
    }

    for section in &digest.sections {
        let note = match &section.status {
            CategoryStatus::Fresh => String::new(),
            CategoryStatus::Stale { cached_at, .. } => {
                format!(" (cached {})", cached_at.format("%Y-%m-%d %H:%M UTC"))
            }
            other => format!(" ({})", other.label()),
        };
        println!("== {}{} ==\n", section.category, note);

        for entry in &section.entries {
            let article = &entry.article;
            let mut flags = Vec::new();
            if entry.is_saved {
                flags.push("saved".to_string());
            }
            if let Some(score) = entry.rating {
                flags.push(format!("rated {}/5", score));
            }
            let published = article
                .published_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "undated".to_string());

            println!("{}", article.title);
            println!(
                "  {} | {} | {} min read{}",
                article.source,
                published,
                entry.reading_minutes,
                if flags.is_empty() {
                    String::new()
                } else {
                    format!(" | {}", flags.join(", "))
                }
            );
            println!("{}", wrap(article.display_text(), "  "));
            println!("  {}", article.url);
            println!("  id: {}\n", article.id);
        }
    }
}

fn wrap(text: &str, indent: &str) -> String {
    let options = textwrap::Options::new(WRAP_WIDTH)
        .initial_indent(indent)
        .subsequent_indent(indent);
    textwrap::fill(text, options)
}

fn display_list(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}
