use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use sonet::config::{FLUSH_INTERVAL, META_HISTORY_KIND};
use sonet::dump::DumpName;
use sonet::history::{load_desired, run_history, ArticleFilter, HistoryConfig, TimeWindow};
use sonet::models::PageFilter;
use sonet::processors::coedit::CoEditGraph;
use sonet::processors::demographics::{load_genders, DemographicStats};
use sonet::processors::page_sample::PageSampler;
use sonet::processors::revisions::RevisionExtractor;
use sonet::processors::talk_graph::{default_welcome_pattern, TalkGraph, TalkGraphConfig};
use sonet::siteinfo::{SiteInfo, NS_TALK};
use sonet::sink::CsvSink;
use sonet::stats::RunStats;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "sonet")]
#[command(about = "Extract social networks and revision data from MediaWiki dumps")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the user talk network of meta-history dumps
    TalkGraph(TalkGraphArgs),
    /// Build the co-edit network (editor -> page author)
    CoeditGraph(CoEditArgs),
    /// Write per-page edit and editor counts by gender
    Demographics(DemographicsArgs),
    /// Write a random sample of page titles
    SamplePages(SampleArgs),
    /// Write the text inserted by every revision of the desired pages
    Revisions(RevisionsArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// Dump files (.xml or .xml.bz2); several dumps are processed in parallel
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output directory for generated files
    #[arg(short, long)]
    output: String,

    /// Skip revisions before this day (YYYY-MM-DD)
    #[arg(long, value_parser = parse_day)]
    start: Option<NaiveDate>,

    /// Skip revisions after this day (YYYY-MM-DD)
    #[arg(long, value_parser = parse_day)]
    end: Option<NaiveDate>,

    /// Seed for page sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Completed pages between two output flushes
    #[arg(long, default_value_t = FLUSH_INTERVAL)]
    flush_interval: u64,
}

#[derive(Args)]
struct FilterArgs {
    /// Page types to keep
    #[arg(short = 't', long = "type", value_enum, default_value_t = PageFilter::All)]
    page_type: PageFilter,

    /// Probability of keeping a page that is not in the desired list
    #[arg(long, default_value_t = 1.0)]
    ratio: f64,

    /// CSV file whose first column lists pages that are always kept
    #[arg(long)]
    desired: Option<String>,

    /// Field delimiter of the desired pages file
    #[arg(long, default_value_t = ',')]
    delimiter: char,
}

#[derive(Args)]
struct TalkGraphArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Case-insensitive regex marking welcome messages in edit comments
    /// (defaults to a per-language pattern)
    #[arg(long)]
    welcome: Option<String>,
}

#[derive(Args)]
struct CoEditArgs {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    filter: FilterArgs,
}

#[derive(Args)]
struct DemographicsArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// CSV file with usernames in the second column and genders in the third
    #[arg(long)]
    genders: String,
}

#[derive(Args)]
struct SampleArgs {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    filter: FilterArgs,

    /// Keep only the pages of the desired list
    #[arg(long)]
    desired_only: bool,
}

#[derive(Args)]
struct RevisionsArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// CSV file whose first column lists the pages to extract
    #[arg(long)]
    desired: String,

    /// Field delimiter of the desired pages file
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Page types to keep
    #[arg(short = 't', long = "type", value_enum, default_value_t = PageFilter::All)]
    page_type: PageFilter,
}

fn parse_day(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("invalid day {:?}: {}", s, e))
}

impl CommonArgs {
    fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start.and_then(|d| d.and_hms_opt(0, 0, 0)),
            end: self.end.and_then(|d| d.and_hms_opt(23, 59, 59)),
        }
    }

    fn history_config(&self) -> HistoryConfig {
        HistoryConfig {
            window: self.window(),
            flush_interval: self.flush_interval,
            seed: self.seed,
            ..HistoryConfig::default()
        }
    }

    fn prepare_output(&self) -> Result<()> {
        fs::create_dir_all(&self.output)
            .with_context(|| format!("Failed to create output directory: {}", self.output))
    }

    fn output_path(&self, dump: &DumpName, suffix: &str) -> String {
        Path::new(&self.output)
            .join(format!("{}wiki-{}-{}", dump.lang, dump.date, suffix))
            .to_string_lossy()
            .into_owned()
    }

    /// Runs `job` on every input, in parallel when there are several.
    fn for_each_dump<F>(&self, job: F) -> Result<()>
    where
        F: Fn(&str, bool) -> Result<RunStats> + Sync,
    {
        let progress = self.inputs.len() == 1;
        let results: Vec<(String, Result<RunStats>, f64)> = self
            .inputs
            .par_iter()
            .map(|input| {
                let start = Instant::now();
                let result = job(input, progress);
                (input.clone(), result, start.elapsed().as_secs_f64())
            })
            .collect();

        let mut failed = 0usize;
        for (input, result, secs) in results {
            match result {
                Ok(stats) => print_summary(&input, &stats, secs),
                Err(e) => {
                    error!(input = %input, "Error: {:#}", e);
                    eprintln!("Error processing {}: {:#}", input, e);
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            anyhow::bail!("{} of {} dumps failed", failed, self.inputs.len());
        }
        Ok(())
    }
}

impl FilterArgs {
    fn apply(&self, config: &mut HistoryConfig) -> Result<()> {
        if !(0.0..=1.0).contains(&self.ratio) {
            anyhow::bail!("Ratio must be in [0, 1], got {}", self.ratio);
        }
        config.threshold = self.ratio;
        if let Some(path) = &self.desired {
            config.desired = Some(load_desired(path, delimiter_byte(self.delimiter)?)?);
        }
        Ok(())
    }
}

fn delimiter_byte(c: char) -> Result<u8> {
    u8::try_from(c).with_context(|| format!("Delimiter must be a single byte: {:?}", c))
}

fn article_filter(siteinfo: &SiteInfo, filter: PageFilter) -> Result<ArticleFilter> {
    Ok(ArticleFilter {
        talk_ns: siteinfo.namespaces.require(NS_TALK, "Talk")?.to_string(),
        namespaces: siteinfo.namespaces.clone(),
        filter,
    })
}

fn print_summary(input: &str, stats: &RunStats, secs: f64) {
    println!();
    println!("=== {} ===", input);
    println!("{}", stats);
    println!("Time:                 {:.2}s", secs);
}

fn run_talk_graph(args: TalkGraphArgs) -> Result<()> {
    let common = &args.common;
    common.prepare_output()?;
    common.for_each_dump(|input, progress| {
        let dump = DumpName::parse(input)?;
        dump.require_kind(META_HISTORY_KIND)?;
        let siteinfo = SiteInfo::from_path(input)?;

        let mut config = TalkGraphConfig::from_namespaces(&siteinfo.namespaces)?;
        config.welcome_pattern = args
            .welcome
            .clone()
            .or_else(|| default_welcome_pattern(&dump.lang).map(str::to_string));
        let hooks = TalkGraph::new(config)?;

        info!(input, lang = %dump.lang, "Building talk network");
        let (hooks, stats) =
            run_history(input, &siteinfo, common.history_config(), hooks, progress)?;
        let graph = hooks.network()?;
        graph.write_csv(&common.output, &format!("{}wiki-{}-utp", dump.lang, dump.date))?;
        Ok(stats)
    })
}

fn run_coedit(args: CoEditArgs) -> Result<()> {
    let common = &args.common;
    common.prepare_output()?;
    let mut config = common.history_config();
    args.filter.apply(&mut config)?;

    common.for_each_dump(|input, progress| {
        let dump = DumpName::parse(input)?;
        dump.require_kind(META_HISTORY_KIND)?;
        let siteinfo = SiteInfo::from_path(input)?;
        let hooks = CoEditGraph::new(article_filter(&siteinfo, args.filter.page_type)?);

        info!(input, lang = %dump.lang, "Building co-edit network");
        let (hooks, stats) = run_history(input, &siteinfo, config.clone(), hooks, progress)?;
        let graph = hooks.network()?;
        graph.write_csv(&common.output, &format!("{}wiki-{}-coedit", dump.lang, dump.date))?;
        Ok(stats)
    })
}

fn run_demographics(args: DemographicsArgs) -> Result<()> {
    let common = &args.common;
    common.prepare_output()?;
    let genders = load_genders(&args.genders)?;
    let config = common.history_config();

    common.for_each_dump(|input, progress| {
        let dump = DumpName::parse(input)?;
        dump.require_kind(META_HISTORY_KIND)?;
        let siteinfo = SiteInfo::from_path(input)?;
        let talk_ns = siteinfo.namespaces.require(NS_TALK, "Talk")?;
        let sink = CsvSink::create(&common.output_path(&dump, "demographics.csv"))?;
        let hooks =
            DemographicStats::new(siteinfo.namespaces.clone(), talk_ns, genders.clone(), sink);

        let (hooks, stats) = run_history(input, &siteinfo, config.clone(), hooks, progress)?;
        hooks
            .into_sink()
            .into_inner()?
            .flush()
            .with_context(|| format!("Failed to flush output of {}", input))?;
        Ok(stats)
    })
}

fn run_sample(args: SampleArgs) -> Result<()> {
    let common = &args.common;
    common.prepare_output()?;
    let mut config = common.history_config();
    args.filter.apply(&mut config)?;
    if args.desired_only && config.desired.is_none() {
        anyhow::bail!("--desired-only needs --desired");
    }
    config.desired_only = args.desired_only;

    common.for_each_dump(|input, progress| {
        let dump = DumpName::parse(input)?;
        let siteinfo = SiteInfo::from_path(input)?;
        let sink = CsvSink::create(&common.output_path(&dump, "sample.csv"))?;
        let hooks = PageSampler::new(article_filter(&siteinfo, args.filter.page_type)?, sink);

        let (hooks, stats) = run_history(input, &siteinfo, config.clone(), hooks, progress)?;
        info!(input, peak_queue = hooks.peak_queue(), "Sample written");
        hooks
            .into_sink()
            .into_inner()?
            .flush()
            .with_context(|| format!("Failed to flush output of {}", input))?;
        Ok(stats)
    })
}

fn run_revisions(args: RevisionsArgs) -> Result<()> {
    let common = &args.common;
    common.prepare_output()?;
    let mut config = common.history_config();
    config.desired = Some(load_desired(&args.desired, delimiter_byte(args.delimiter)?)?);
    config.desired_only = true;

    common.for_each_dump(|input, progress| {
        let dump = DumpName::parse(input)?;
        dump.require_kind(META_HISTORY_KIND)?;
        let siteinfo = SiteInfo::from_path(input)?;
        let sink = CsvSink::create(&common.output_path(&dump, "revisions.csv"))?;
        let hooks =
            RevisionExtractor::new(&dump.lang, article_filter(&siteinfo, args.page_type)?, sink);

        let (hooks, stats) = run_history(input, &siteinfo, config.clone(), hooks, progress)?;
        info!(input, reverts = hooks.reverts(), "Revisions written");
        hooks
            .into_sink()
            .into_inner()?
            .flush()
            .with_context(|| format!("Failed to flush output of {}", input))?;
        Ok(stats)
    })
}

/// `RUST_LOG` wins when set and valid; otherwise `-v` picks the level.
fn log_filter(verbose: u8, rust_log: Option<&str>) -> EnvFilter {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        match EnvFilter::try_new(directives) {
            Ok(filter) => return filter,
            Err(e) => eprintln!("Ignoring invalid RUST_LOG {:?}: {}", directives, e),
        }
    }
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    EnvFilter::default().add_directive(level.into())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let rust_log = std::env::var("RUST_LOG").ok();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(cli.verbose, rust_log.as_deref()))
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::TalkGraph(args) => run_talk_graph(args),
        Commands::CoeditGraph(args) => run_coedit(args),
        Commands::Demographics(args) => run_demographics(args),
        Commands::SamplePages(args) => run_sample(args),
        Commands::Revisions(args) => run_revisions(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
