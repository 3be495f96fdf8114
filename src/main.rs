use clap::{Parser, Subcommand};
use colored::Colorize;
use crossworks::report::{render_member, WorksReport};
use crossworks::{
    crossref_aggregator, AggregatorOptions, ClientConfig, Collection, CollectionKind,
    CrossrefAggregator, SortOrder, WorksQuery,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "crossworks")]
#[command(version)]
#[command(about = "List works from the Crossref REST API", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Contact address sent with every request (overrides CROSSREF_MAILTO)
    #[arg(long, global = true)]
    mailto: Option<String>,

    /// API root (overrides CROSSREF_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Request timeout in seconds (overrides CROSSREF_TIMEOUT_SECS)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Print records as JSON instead of a formatted listing
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a single page of works
    Works {
        /// Collection identifier, e.g. a member ID
        id: String,

        /// Collection kind: members, journals, funders, prefixes or types
        #[arg(long, default_value = "members")]
        kind: CollectionKind,

        /// Page size (at most 100)
        #[arg(long, default_value_t = 20)]
        rows: u32,

        #[arg(long)]
        offset: Option<u64>,

        #[arg(long)]
        filter: Option<String>,

        #[arg(long)]
        query: Option<String>,

        #[arg(long, default_value = "published")]
        sort: String,

        #[arg(long, default_value = "desc")]
        order: SortOrder,

        /// Comma separated list of fields to return
        #[arg(long)]
        select: Option<String>,
    },

    /// Fetch every work in a collection, newest first
    All {
        id: String,

        #[arg(long, default_value = "members")]
        kind: CollectionKind,

        /// Stop after this many works
        #[arg(long)]
        max: Option<usize>,

        #[arg(long)]
        filter: Option<String>,

        #[arg(long)]
        query: Option<String>,

        #[arg(long)]
        select: Option<String>,

        /// Stop after this many page requests
        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// Show a member record
    Member { id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    init_tracing(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("crossworks=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn client_config(args: &Args) -> ClientConfig {
    let mut config = ClientConfig::from_env();
    if let Some(mailto) = &args.mailto {
        config = config.with_mailto(mailto.clone());
    }
    if let Some(base_url) = &args.base_url {
        config = config.with_base_url(base_url.clone());
    }
    if let Some(secs) = args.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    config
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = client_config(&args);

    match args.command {
        Command::Works {
            id,
            kind,
            rows,
            offset,
            filter,
            query,
            sort,
            order,
            select,
        } => {
            let aggregator = crossref_aggregator(config, AggregatorOptions::default())?;
            let collection = Collection::new(kind, id);

            let mut works_query = WorksQuery::new().with_rows(rows).with_sort(sort, order);
            if let Some(offset) = offset {
                works_query = works_query.with_offset(offset);
            }
            if let Some(filter) = filter {
                works_query = works_query.with_filter(filter);
            }
            if let Some(query) = query {
                works_query = works_query.with_query(query);
            }
            if let Some(select) = select {
                works_query = works_query.with_select(select);
            }

            let page = aggregator
                .fetch_single_page(&collection, &works_query)
                .await?;

            if args.json {
                println!("{}", WorksReport::new("", &page.items).to_json()?);
            } else {
                WorksReport::new(format!("Works for {}", collection), &page.items)
                    .with_total(page.total_results)
                    .print();
            }
        }
        Command::All {
            id,
            kind,
            max,
            filter,
            query,
            select,
            max_pages,
        } => {
            let aggregator = crossref_aggregator(config, AggregatorOptions { max_pages })?;
            let collection = Collection::new(kind, id);

            let mut base = WorksQuery::new();
            if let Some(filter) = filter {
                base = base.with_filter(filter);
            }
            if let Some(query) = query {
                base = base.with_query(query);
            }
            if let Some(select) = select {
                base = base.with_select(select);
            }

            let works = with_progress(&aggregator, !args.json, || {
                aggregator.fetch_all_matching(&collection, base, max)
            })
            .await?;

            if args.json {
                println!("{}", WorksReport::new("", &works).to_json()?);
            } else {
                WorksReport::new(format!("All works for {}", collection), &works).print();
            }
        }
        Command::Member { id } => {
            let aggregator = crossref_aggregator(config, AggregatorOptions::default())?;
            let member = aggregator.fetch_member(&id).await?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&member)?);
            } else {
                print!("{}", render_member(&member));
            }
        }
    }

    Ok(())
}

/// Run `fetch` while a spinner follows the aggregator's accumulated count
async fn with_progress<T, Fut>(
    aggregator: &CrossrefAggregator,
    enabled: bool,
    fetch: impl FnOnce() -> Fut,
) -> T
where
    Fut: std::future::Future<Output = T>,
{
    if !enabled {
        return fetch().await;
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
    {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Fetching works...");

    let mut rx = aggregator.subscribe();
    let watcher_pb = pb.clone();
    let watcher = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let count = rx.borrow_and_update().works().len();
            watcher_pb.set_message(format!("{} works fetched", count));
        }
    });

    let result = fetch().await;

    watcher.abort();
    pb.finish_and_clear();
    result
}
