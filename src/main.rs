use clap::Parser;
use clap::builder::PossibleValuesParser;
use lib::structs::DEFAULT_ENDPOINT;
use lib::{
    AnalysisConfig, CityStatistics, DISPLAY_NAMES, FetchConfig, FetchError, LiveCheck,
    PipelineError, Season, Session, SimpleLogger, WeatherClient, build_summaries,
    read_observations, write_csv, write_json, write_live_json, write_parquet, write_series_csv,
};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

static LOGGER: SimpleLogger = SimpleLogger;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Historical observations (CSV or Parquet with city, timestamp, temperature, season columns)
    #[arg(short, long)]
    input_file: PathBuf,

    /// Season to compare the current temperature against
    #[arg(short, long, default_value = "Зима", value_parser = PossibleValuesParser::new(DISPLAY_NAMES))]
    season: String,

    /// City to report on. If not specified, reports every city in the dataset.
    #[arg(short, long)]
    city: Option<String>,

    /// OpenWeatherMap API key. Without it only the historical analysis runs.
    #[arg(long)]
    api_key: Option<String>,

    /// Current-weather endpoint
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Per-request timeout for the current-weather service, in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Rolling window length (observations) for anomaly detection
    #[arg(long, default_value_t = 30)]
    window: usize,

    /// Anomaly threshold (standard deviations from the rolling mean)
    #[arg(long, default_value_t = 2.0)]
    sigma: f64,

    /// Output base name (will create dir containing .csv, .json, and .parquet files)
    #[arg(short, long, default_value = "output")]
    output: String,

    /// Log level for output
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let total_start = Instant::now();
    if let Err(err) = log::set_logger(&LOGGER) {
        eprintln!("logger already installed: {}", err);
    }

    let args = Args::parse();
    if args.debug {
        log::set_max_level(log::LevelFilter::Debug);
    } else {
        log::set_max_level(log::LevelFilter::Info);
    }

    let season = Season::from_display_name(&args.season)?;
    let analysis_config = AnalysisConfig {
        window: args.window,
        sigma: args.sigma,
    };
    let fetch_config = FetchConfig {
        endpoint: args.endpoint.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
    };

    println!("Seasonal! Weather anomaly check");
    debug!(
        "Input file: {} | Season: {} ({})",
        args.input_file.display(),
        args.season,
        season
    );
    debug!(
        "Rolling window={} sigma={} | endpoint={} timeout={:?}",
        analysis_config.window, analysis_config.sigma, fetch_config.endpoint, fetch_config.timeout
    );

    // Historical analysis, computed once and reused for validation
    let processing_start = Instant::now();
    let records = read_observations(&args.input_file)?;
    let mut session = Session::default().load(records, &analysis_config);
    println!(
        "Historical analysis completed in {:.2?}",
        processing_start.elapsed()
    );

    let selected: Vec<String> = {
        let Some(data) = session.data() else {
            return Err(PipelineError::DataFormat("no dataset loaded".to_string()));
        };
        for (city, err) in &data.analysis.failures {
            warn!("Skipping {}: {}", city, err);
        }
        match &args.city {
            Some(city) if data.analysis.stats.contains_key(city) => vec![city.clone()],
            Some(city) => return Err(PipelineError::EmptySeries(city.clone())),
            None => data.cities.clone(),
        }
    };

    if let Some(data) = session.data() {
        for city in &selected {
            if let Some(stats) = data.analysis.stats.get(city) {
                print_city_report(stats, season);
            }
        }
    }

    // Live check
    let mut live_check: Option<LiveCheck> = None;
    if let Some(api_key) = args.api_key.clone() {
        let client = WeatherClient::new(&fetch_config)?;
        let probe_city = selected.first().map(String::as_str);
        let (verified, err) = session
            .verify_credential(&client, api_key, probe_city)
            .await;
        session = verified;
        match err {
            Some(FetchError::CredentialRejected { message }) => {
                println!("\nCredential rejected (401): {}", message);
                println!("Historical analysis above is unaffected.");
            }
            Some(other) => println!(
                "\nNo current reading for {}: {}; checking the remaining cities",
                probe_city.unwrap_or("first city"),
                other
            ),
            None => {}
        }

        let fetch_start = Instant::now();
        live_check = session.live_check(&client, season, &selected).await;
        if let Some(check) = &live_check {
            debug!("Live check took {:.2?}", fetch_start.elapsed());
            print_live_check(check, &selected, season);
        }
    } else {
        println!("\nNo API key given; skipping the current-temperature check");
    }

    // Exports
    let Some(data) = session.data() else {
        return Ok(());
    };
    let (live, verdicts) = match &live_check {
        Some(check) => (check.live.clone(), check.verdicts.clone()),
        None => (BTreeMap::new(), BTreeMap::new()),
    };
    let summaries = build_summaries(&data.analysis.stats, season, &live, &verdicts);

    let output_dir = PathBuf::from(format!("./output/{}", args.output));
    fs::create_dir_all(&output_dir)?;
    let io_start = Instant::now();

    // Extract just the directory name for the file names (remove path separators)
    let output_name = args
        .output
        .split(['/', '\\'])
        .next_back()
        .unwrap_or(&args.output);
    let csv_path = output_dir.join(format!("{}.csv", output_name));
    let json_path = output_dir.join(format!("{}.json", output_name));
    let parquet_path = output_dir.join(format!("{}.parquet", output_name));
    let series_path = output_dir.join(format!("{}_series.csv", output_name));
    let live_path = output_dir.join(format!("{}_live.json", output_name));

    write_csv(&summaries, &csv_path)?;
    write_json(&summaries, &json_path)?;
    write_parquet(&summaries, &parquet_path)?;
    write_series_csv(&data.analysis.stats, &series_path)?;
    if live_check.is_some() {
        write_live_json(&live, &live_path)?;
    }

    println!(
        "\nWrote {} city summaries to directory: {} ({:.2?})",
        summaries.len(),
        output_dir.display(),
        io_start.elapsed()
    );
    debug!("  - {}", csv_path.display());
    debug!("  - {}", json_path.display());
    debug!("  - {}", parquet_path.display());
    debug!("  - {}", series_path.display());
    if live_check.is_some() {
        debug!("  - {}", live_path.display());
    }

    println!("\nTotal runtime: {:.2?}", total_start.elapsed());
    Ok(())
}

fn print_city_report(stats: &CityStatistics, season: Season) {
    println!("\nCity: {}", stats.city);
    println!("  Temperature");
    println!("  - Mean: {:.2}°C", stats.mean_temp);
    println!("  - Min:  {:.2}°C", stats.min_temp);
    println!("  - Max:  {:.2}°C", stats.max_temp);

    println!("  Season profile");
    for (s, profile) in &stats.season_profile {
        let marker = if *s == season { "*" } else { " " };
        match profile.std {
            Some(std) => println!(
                "  {} {:<7} avg={:>7.2} std={:>6.2} n={}",
                marker, s, profile.average, std, profile.count
            ),
            None => println!(
                "  {} {:<7} avg={:>7.2} std=   n/a n={}",
                marker, s, profile.average, profile.count
            ),
        }
    }

    println!(
        "  Trend: {:+.3}°C per year | Anomalies: {} of {}",
        stats.trend_line.slope_per_year(),
        stats.anomaly_count(),
        stats.count
    );
}

fn print_live_check(check: &LiveCheck, selected: &[String], season: Season) {
    println!("\nIs the weather normal for {}?", season.display_name());
    for city in selected {
        let current = check
            .live
            .get(city)
            .and_then(|l| l.celsius())
            .map(|t| format!("{:.2}°C", t))
            .unwrap_or_else(|| "n/a".to_string());
        let verdict = check
            .verdicts
            .get(city)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "no data".to_string());
        println!("  {:<20} current={:>9} -> {}", city, current, verdict);
    }
}
