use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use noise_corr::config::NoiseCorrConfig;
use noise_corr::error::NCError;
use noise_corr::pipeline::NoiseCorrelationPipeline;
use noise_corr::ratemap::{AreaRoster, RatemapFinder, RatemapQuery};
use noise_corr::session::JsonSession;

#[derive(Parser, Debug)]
#[command(version, about = "Noise correlations and ratemap selection for spike-sorted sessions")]
struct Cli {
    /// Also write the log to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// The log level, one of: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute the noise correlation of one cluster pair of a session
    NoiseCorr(NoiseCorrArgs),
    /// List the ratemap files of the clusters of interest
    FindRatemaps(FindRatemapsArgs),
}

#[derive(Args, Debug)]
struct NoiseCorrArgs {
    /// The session, as a JSON file
    session: PathBuf,
    /// The directory where the record is saved
    #[arg(long)]
    save_dir: PathBuf,
    /// The configuration, as a JSON file (defaults for every missing option)
    #[arg(long)]
    config: Option<PathBuf>,
    /// The job index, overriding the configuration
    #[arg(long)]
    combo_idx: Option<usize>,
    /// The jitter seed, overriding the configuration
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct FindRatemapsArgs {
    /// The directory of the ratemap files
    #[arg(long)]
    ratemap_dir: PathBuf,
    /// The directory of the sessions, as JSON files
    #[arg(long)]
    sessions_dir: PathBuf,
    /// The query, as a JSON file (defaults for every missing option)
    #[arg(long)]
    query: Option<PathBuf>,
    /// The area roster, as a JSON file (built-in roster if omitted)
    #[arg(long)]
    roster: Option<PathBuf>,
    /// The area of interest, overriding the query
    #[arg(long)]
    area: Option<String>,
    /// Pair every file with the file of the same cluster in a second session
    #[arg(long)]
    seek_stability: bool,
    /// The type of the second session
    #[arg(long, default_value = "light")]
    session_2_type: String,
    /// Write the selected files to this JSON file
    #[arg(long)]
    output: Option<PathBuf>,
}

fn init_logging(log_file: Option<&PathBuf>, level: LevelFilter) -> Result<(), NCError> {
    let pattern = "{d(%Y-%m-%d %H:%M:%S)} {l} - {m}\n";
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build();

    let mut builder = Config::builder().appender(Appender::builder().build("stdout", Box::new(stdout)));
    let mut root = Root::builder().appender("stdout");

    if let Some(path) = log_file {
        let logfile = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new("{l} - {m}\n")))
            .build(path)
            .map_err(|e| NCError::IOError(e.to_string()))?;
        builder = builder.appender(Appender::builder().build("logfile", Box::new(logfile)));
        root = root.appender("logfile");
    }

    let config = builder
        .build(root.build(level))
        .map_err(|e| NCError::IOError(e.to_string()))?;
    log4rs::init_config(config).map_err(|e| NCError::IOError(e.to_string()))?;
    Ok(())
}

fn noise_corr(args: NoiseCorrArgs) -> Result<(), NCError> {
    let mut config = match &args.config {
        Some(path) => NoiseCorrConfig::load_from(path)?,
        None => NoiseCorrConfig::default(),
    };
    if let Some(combo_idx) = args.combo_idx {
        config.combo_idx = combo_idx;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    log::info!("{:?}", config);

    let pipeline = NoiseCorrelationPipeline::build(config)?;
    let session = JsonSession::load_from(&args.session)?;
    log::info!("Session {} loaded: {} clusters", session.name, session.clusters.len());

    std::fs::create_dir_all(&args.save_dir)?;
    let path = pipeline.run_and_save(&session, &args.save_dir)?;
    log::info!("Noise correlation done! Saved to {}", path.display());
    Ok(())
}

fn find_ratemaps(args: FindRatemapsArgs) -> Result<(), NCError> {
    let mut query = match &args.query {
        Some(path) => RatemapQuery::load_from(path)?,
        None => RatemapQuery::default(),
    };
    if let Some(area) = args.area {
        query.area = area;
    }
    let roster = match &args.roster {
        Some(path) => AreaRoster::load_from(path)?,
        None => AreaRoster::default(),
    };
    log::info!("{:?}", query);

    let finder = RatemapFinder::new(&args.ratemap_dir, roster, query);
    let cluster_sets = finder.collect_clusters(&args.sessions_dir)?;
    log::info!("{} clusters of interest in area {}", cluster_sets.len(), finder.query().area);

    let essential_files = finder.find(&cluster_sets, args.seek_stability, &args.session_2_type)?;
    match &args.output {
        Some(path) => {
            let writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(writer, &essential_files)
                .map_err(|e| NCError::IOError(e.to_string()))?;
            log::info!("Selected files saved to {}", path.display());
        }
        None => {
            let json = serde_json::to_string_pretty(&essential_files)
                .map_err(|e| NCError::IOError(e.to_string()))?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn main() -> Result<(), NCError> {
    let cli = Cli::parse();
    let level = cli
        .log_level
        .parse::<LevelFilter>()
        .map_err(|e| NCError::InvalidParameter(format!("log level {}: {}", cli.log_level, e)))?;
    init_logging(cli.log_file.as_ref(), level)?;

    let result = match cli.command {
        Command::NoiseCorr(args) => noise_corr(args),
        Command::FindRatemaps(args) => find_ratemaps(args),
    };
    if let Err(e) = &result {
        log::error!("{}", e);
    }
    result
}
