use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keyword_harvester::{Config, ContentKind, ItemListing, KeywordSet, TaskOrchestrator, TaskStatus};

fn cli() -> Command {
    Command::new("Keyword Harvester")
        .version("0.1.0")
        .author("TigreRoll")
        .about("Harvest PDFs, images and videos for keyword lists")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (defaults to keyword-harvester.toml lookup)")
                .global(true),
        )
        .arg(
            Arg::new("memory")
                .long("memory")
                .help("Use the in-memory store even if a database is configured")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Harvest content for the keywords in one or more files")
                .arg(
                    Arg::new("file")
                        .short('f')
                        .long("file")
                        .value_name("FILE")
                        .help("Keyword file, one keyword per line (first CSV column)")
                        .action(ArgAction::Append)
                        .required(true),
                )
                .arg(Arg::new("pdf").long("pdf").help("Collect PDFs").action(ArgAction::SetTrue))
                .arg(Arg::new("image").long("image").help("Collect images").action(ArgAction::SetTrue))
                .arg(Arg::new("video").long("video").help("Collect YouTube videos").action(ArgAction::SetTrue)),
        )
        .subcommand(
            Command::new("items")
                .about("Print stored items as JSON")
                .arg(Arg::new("task").long("task").value_name("ID").help("Only items of this task"))
                .arg(Arg::new("all").long("all").help("Every stored item").action(ArgAction::SetTrue))
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_name("NUM")
                        .help("Maximum items, 0 for no limit")
                        .default_value("0"),
                )
                .arg(
                    Arg::new("offset")
                        .long("offset")
                        .value_name("NUM")
                        .default_value("0"),
                ),
        )
        .subcommand(
            Command::new("sources")
                .about("Print the source files of a task")
                .arg(Arg::new("task").long("task").value_name("ID").required(true)),
        )
        .subcommand(Command::new("clear").about("Delete every stored item"))
        .subcommand(Command::new("config").about("Print the effective configuration"))
}

fn init_logging(config: &Config, verbose: bool) {
    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("keyword_harvester=debug,info"))
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        let filter = EnvFilter::try_new(&config.logging.level)
            .unwrap_or_else(|_| EnvFilter::new("keyword_harvester=info,warn"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(matches: &ArgMatches) -> Config {
    let loaded = match matches.get_one::<String>("config") {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    loaded.unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        Config::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config = load_config(&matches);
    init_logging(&config, matches.get_flag("verbose"));

    if let Some(("config", _)) = matches.subcommand() {
        println!("{}", config.summary());
        println!("\n{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    config.validate()?;
    let orchestrator = TaskOrchestrator::from_config(&config, matches.get_flag("memory")).await?;

    match matches.subcommand() {
        Some(("run", sub)) => run(&orchestrator, &config, sub).await?,
        Some(("items", sub)) => {
            let listing = ItemListing {
                task_id: sub.get_one::<String>("task").cloned(),
                all_items: sub.get_flag("all"),
                limit: sub.get_one::<String>("limit").map_or(Ok(0), |s| s.parse())?,
                offset: sub.get_one::<String>("offset").map_or(Ok(0), |s| s.parse())?,
            };
            let page = orchestrator.list_items(listing).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Some(("sources", sub)) => {
            if let Some(task_id) = sub.get_one::<String>("task") {
                for file in orchestrator.list_source_files(task_id).await? {
                    println!("{}", file);
                }
            }
        }
        Some(("clear", _)) => {
            let removed = orchestrator.clear_items().await?;
            println!("Deleted {} items", removed);
        }
        _ => unreachable!("subcommand is required"),
    }

    Ok(())
}

async fn run(orchestrator: &TaskOrchestrator, config: &Config, matches: &ArgMatches) -> Result<()> {
    let mut keyword_sets = Vec::new();
    for file in matches.get_many::<String>("file").into_iter().flatten() {
        let set = KeywordSet::from_file(&PathBuf::from(file)).await?;
        info!("📄 {}: {} keywords", set.source_file, set.keywords.len());
        keyword_sets.push(set);
    }

    let mut kinds = Vec::new();
    if matches.get_flag("pdf") {
        kinds.push(ContentKind::Pdf);
    }
    if matches.get_flag("image") {
        kinds.push(ContentKind::Image);
    }
    if matches.get_flag("video") {
        kinds.push(ContentKind::Video);
    }
    if kinds.is_empty() {
        kinds = ContentKind::ALL.to_vec();
    }

    let receipt = orchestrator.submit(keyword_sets, &kinds).await?;
    info!("🚀 Task {} submitted", receipt.task_id);
    if receipt.resumable_mode {
        info!(
            "🔁 Resuming: {} new keywords, {} already scraped",
            receipt.new_keywords_count, receipt.skipped_keywords_count
        );
    }

    let progress = orchestrator
        .wait_for(&receipt.task_id, config.progress.poll_interval())
        .await?;

    match &progress.status {
        TaskStatus::Completed => info!(
            "🎉 Completed {}/{} keywords: {} PDFs, {} images, {} videos",
            progress.current_keyword_index,
            progress.total_keywords,
            progress.pdf_count,
            progress.image_count,
            progress.youtube_count
        ),
        TaskStatus::Error(reason) => warn!(
            "❌ Task stopped after {}/{} keywords: {}",
            progress.current_keyword_index, progress.total_keywords, reason
        ),
        _ => {}
    }

    println!("{}", serde_json::to_string_pretty(&progress)?);
    Ok(())
}
