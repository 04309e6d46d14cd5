use anyhow::{Context, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tangle_core::{CrawlLevel, CrawlOutcome, CrawlSpec, GraphDocument, RequestStatistics, start};
use tangle_net::{Credentials, Direction, EndpointConfig, HttpFetcher, JsonRelationSource};
use tracing::debug;

pub(crate) async fn handle_crawl(args: &ArgMatches, quiet: bool) -> anyhow::Result<i32> {
    let spec = build_spec(args)?;
    let config = load_endpoint_config(args.get_one::<String>("api").unwrap())?;

    let mut fetcher = HttpFetcher::new(spec.http_timeout, spec.http_retries);
    if let Some(credentials) = spec.credentials.clone() {
        fetcher = fetcher.with_credentials(credentials);
    }
    let source =
        JsonRelationSource::new(fetcher, config).context("invalid endpoint configuration")?;

    if !quiet {
        let passes: Vec<&str> = spec.directions.iter().map(|d| d.as_str()).collect();
        println!(
            "Crawling '{}' at level {} ({})\n",
            spec.seed_key.bold(),
            spec.level.as_str(),
            passes.join(" + "),
        );
    }

    let mut handle = start(spec, Arc::new(source))?;

    // Ctrl-C requests cooperative cancellation; the crawl unwinds at
    // its next suspension point.
    let flag = handle.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.cancel();
        }
    });

    let spinner = if quiet {
        None
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        Some(spinner)
    };

    // Drained until the engine drops its sender at terminal state.
    while let Some(event) = handle.progress.recv().await {
        if let Some(spinner) = &spinner {
            spinner.set_message(event.to_string());
        }
    }
    if let Some(spinner) = &spinner {
        spinner.finish_and_clear();
    }

    let output = args.get_one::<String>("output");
    match handle.join().await? {
        CrawlOutcome::Completed(graph) => {
            if !quiet {
                println!("{}", "✓ Crawl complete".green().bold());
                print_summary(&graph, None);
            }
            write_graph(&graph, output)?;
            Ok(0)
        }
        CrawlOutcome::PartialFailure {
            graph,
            stats,
            cause,
        } => {
            // The graph accumulated before the failure is still usable
            // data; write it out, then signal the failure.
            eprintln!("{} crawl aborted: {}", "✗".red(), cause);
            if !quiet {
                print_summary(&graph, Some(&stats));
            }
            write_graph(&graph, output)?;
            Ok(1)
        }
        CrawlOutcome::Cancelled => {
            eprintln!("{} crawl cancelled", "✗".yellow());
            Ok(130)
        }
    }
}

fn print_summary(graph: &GraphDocument, stats: Option<&RequestStatistics>) {
    println!("  Vertices: {}", graph.vertices.len());
    println!("  Edges: {}", graph.edges.len());
    if let Some(stats) = stats {
        println!(
            "  Requests: {} ok, {} failed",
            stats.success_count, stats.failure_count
        );
        if let Some(last_error) = &stats.last_error {
            println!("  Last error: {}", last_error.red());
        }
    }
}

fn write_graph(graph: &GraphDocument, output: Option<&String>) -> anyhow::Result<()> {
    let rendered =
        serde_json::to_string_pretty(graph).context("failed to render graph document")?;
    match output {
        Some(path) => {
            let expanded = shellexpand::tilde(path);
            fs::write(expanded.as_ref(), rendered)
                .with_context(|| format!("failed to write graph document to {}", expanded))?;
            debug!("graph document written to {}", expanded);
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

fn build_spec(args: &ArgMatches) -> anyhow::Result<CrawlSpec> {
    let seed = args.get_one::<String>("SEED").unwrap();
    let level_arg = args.get_one::<String>("level").unwrap();
    let level = CrawlLevel::parse(level_arg)
        .with_context(|| format!("unrecognized crawl level '{}'", level_arg))?;

    let mut spec = CrawlSpec::new(seed)
        .with_level(level)
        .with_directions(parse_directions(args.get_one::<String>("direction").unwrap()));

    if let Some(max) = args.get_one::<usize>("max") {
        spec = spec.with_max_items(*max);
    }
    if args.get_flag("include-extras") {
        spec = spec.with_extra_attributes();
    }

    spec.http_timeout = Duration::from_millis(*args.get_one::<u64>("timeout-ms").unwrap());
    spec.http_retries = *args.get_one::<u32>("retries").unwrap();

    match (
        args.get_one::<String>("user"),
        args.get_one::<String>("secret"),
    ) {
        (Some(username), Some(secret)) => {
            spec.credentials = Some(Credentials {
                username: username.clone(),
                secret: secret.clone(),
            });
        }
        (None, None) => {}
        _ => bail!("--user and --secret must be provided together"),
    }

    Ok(spec)
}

fn parse_directions(arg: &str) -> Vec<Direction> {
    match arg {
        "in" => vec![Direction::Incoming],
        "both" => vec![Direction::Outgoing, Direction::Incoming],
        _ => vec![Direction::Outgoing],
    }
}

fn load_endpoint_config(path: &str) -> anyhow::Result<EndpointConfig> {
    let expanded = shellexpand::tilde(path);
    let raw = fs::read_to_string(expanded.as_ref())
        .with_context(|| format!("failed to read endpoint config {}", expanded))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid endpoint config", expanded))
}
