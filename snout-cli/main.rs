use snout_cli::codec;
use snout_cli::draw::render_features;
use snout_cli::{AnalysisResult, AnalyzerConfig, SnoutAnalyzer, SnoutResult};
use snout_core::{default_threads, init_thread_pool};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "snout", about = "Muzzle-print detection, description and matching")]
struct Opt {
    /// Pipeline configuration (TOML, or JSON by extension).
    #[structopt(short, long, parse(from_os_str), global = true)]
    config: Option<PathBuf>,
    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Detect the snout in an image and print its encoded features as JSON.
    ///
    /// Exits with status 2 when no snout is found.
    Analyze {
        #[structopt(parse(from_os_str))]
        image: PathBuf,
        /// Write the result here instead of stdout.
        #[structopt(short, long, parse(from_os_str))]
        output: Option<PathBuf>,
    },
    /// Compare two analysis results or bare descriptor blobs.
    Compare {
        #[structopt(parse(from_os_str))]
        query: PathBuf,
        #[structopt(parse(from_os_str))]
        train: PathBuf,
    },
    /// Render the detection, crop window and keypoints onto the image.
    Draw {
        #[structopt(parse(from_os_str))]
        image: PathBuf,
        /// Output path; the image type follows the extension.
        #[structopt(short, long, parse(from_os_str))]
        output: PathBuf,
    },
}

const EXIT_NOT_DETECTED: u8 = 2;

/// Descriptor blob from a file holding an `AnalysisResult` or the blob itself
fn read_descriptors_blob(path: &Path) -> SnoutResult<String> {
    let text = std::fs::read_to_string(path)?;
    match serde_json::from_str::<AnalysisResult>(&text) {
        Ok(result) => Ok(result.descriptors_json),
        Err(_) => Ok(text),
    }
}

fn run(opt: Opt) -> SnoutResult<ExitCode> {
    let config = match &opt.config {
        Some(path) => AnalyzerConfig::load(path)?,
        None => AnalyzerConfig::default(),
    };
    init_thread_pool(config.n_threads.unwrap_or_else(default_threads))?;
    let analyzer = SnoutAnalyzer::from_config(&config)?;

    match opt.cmd {
        Command::Analyze { image, output } => {
            let t0 = Instant::now();
            let bytes = std::fs::read(&image)?;
            let Some(result) = analyzer.analyze(&bytes)? else {
                eprintln!("no snout detected in {}", image.display());
                return Ok(ExitCode::from(EXIT_NOT_DETECTED));
            };
            log::info!("analyzed {} in {:.2?}", image.display(), t0.elapsed());
            let json = serde_json::to_string_pretty(&result).map_err(codec::CodecError::from)?;
            match output {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{}", json),
            }
        }
        Command::Compare { query, train } => {
            let query = read_descriptors_blob(&query)?;
            let train = read_descriptors_blob(&train)?;
            let result = analyzer.compare_blobs(Some(&query), Some(&train))?;
            let json = serde_json::to_string_pretty(&result).map_err(codec::CodecError::from)?;
            println!("{}", json);
        }
        Command::Draw { image: path, output } => {
            let source = image::open(&path)?;
            let Some(features) = analyzer.extract(&source)? else {
                eprintln!("no snout detected in {}", path.display());
                return Ok(ExitCode::from(EXIT_NOT_DETECTED));
            };
            render_features(&source, &features).save(&output)?;
            println!(
                "Drew {} keypoints at confidence {:.3} to {}",
                features.keypoints.len(),
                features.detection.confidence,
                output.display()
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    pretty_env_logger::init();
    match run(Opt::from_args()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
