use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use tracing::info;

use memeclip::clip::{ClipModel, DevicePreference};
use memeclip::config::Config;
use memeclip::feedback::{self, Feedback, LikeStore};
use memeclip::logging;
use memeclip::pipeline::{DecodePolicy, EmbedProgress, Pipeline};
use memeclip::preference::compute_preference;
use memeclip::recommend::Recommender;
use memeclip::store::{self, ArtifactLayout, EmbeddingSource};

#[derive(Debug, Default)]
struct Cli {
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    command: Command,
}

#[derive(Debug, Default, PartialEq)]
enum Command {
    Embed {
        directory: PathBuf,
        device: Option<DevicePreference>,
        skip_undecodable: bool,
    },
    /// `likes: None` reads the stored likes; `normalize: None` follows the config
    Preference {
        likes: Option<Vec<i64>>,
        normalize: Option<bool>,
        source: EmbeddingSource,
    },
    Recommend {
        likes: Option<Vec<i64>>,
        normalize: Option<bool>,
        top_k: Option<usize>,
        exclude_liked: bool,
        source: EmbeddingSource,
    },
    Feedback {
        action: Feedback,
        index: i64,
    },
    Status,
    #[default]
    Help,
    Version,
}

fn parse_args() -> Cli {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args_from(&args) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("Error: {}", message);
            print_help();
            std::process::exit(1);
        }
    }
}

fn parse_args_from(args: &[String]) -> Result<Cli, String> {
    let mut cli = Cli::default();
    let mut subcommand: Option<String> = None;
    let mut positional: Option<String> = None;
    let mut device = None;
    let mut skip_undecodable = false;
    let mut likes = None;
    let mut normalize = None;
    let mut top_k = None;
    let mut exclude_liked = false;
    let mut source = EmbeddingSource::Npy;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => return Ok(Cli { command: Command::Help, ..cli }),
            "--version" | "-V" => return Ok(Cli { command: Command::Version, ..cli }),
            "--config" | "-c" => {
                cli.config_path = Some(PathBuf::from(value_at(args, i)?));
                i += 1;
            }
            "--data" | "-d" => {
                cli.data_dir = Some(PathBuf::from(value_at(args, i)?));
                i += 1;
            }
            "--device" => {
                device = Some(value_at(args, i)?.parse::<DevicePreference>()?);
                i += 1;
            }
            "--skip-undecodable" => skip_undecodable = true,
            "--likes" | "-l" => {
                likes = Some(parse_likes(value_at(args, i)?)?);
                i += 1;
            }
            "--normalize" => normalize = Some(true),
            "--no-normalize" => normalize = Some(false),
            "--top-k" | "-k" => {
                let raw = value_at(args, i)?;
                top_k = Some(
                    raw.parse::<usize>()
                        .map_err(|_| format!("invalid --top-k value '{}'", raw))?,
                );
                i += 1;
            }
            "--exclude-liked" => exclude_liked = true,
            "--csv" => source = EmbeddingSource::Csv,
            // Negative numbers are indices, left for the range check
            arg if arg.starts_with('-') && arg.parse::<i64>().is_err() => {
                return Err(format!("Unknown argument: {}", arg))
            }
            arg if subcommand.is_none() => subcommand = Some(arg.to_string()),
            arg if positional.is_none() => positional = Some(arg.to_string()),
            arg => return Err(format!("Unexpected argument: {}", arg)),
        }
        i += 1;
    }

    cli.command = match subcommand.as_deref() {
        None => Command::Help,
        Some("embed") => Command::Embed {
            directory: positional.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data/memes")),
            device,
            skip_undecodable,
        },
        Some("preference") => Command::Preference {
            likes,
            normalize,
            source,
        },
        Some("recommend") => Command::Recommend {
            likes,
            normalize,
            top_k,
            exclude_liked,
            source,
        },
        Some(name @ ("like" | "skip")) => {
            let raw = positional.ok_or_else(|| format!("{} requires an index", name))?;
            Command::Feedback {
                action: if name == "like" { Feedback::Like } else { Feedback::Skip },
                index: raw
                    .parse::<i64>()
                    .map_err(|_| format!("invalid index '{}'", raw))?,
            }
        }
        Some("status") => Command::Status,
        Some(other) => return Err(format!("Unknown command: {}", other)),
    };

    Ok(cli)
}

fn value_at(args: &[String], i: usize) -> Result<&String, String> {
    args.get(i + 1)
        .ok_or_else(|| format!("{} requires an argument", args[i]))
}

fn parse_likes(raw: &str) -> Result<Vec<i64>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().map_err(|_| format!("invalid liked index '{}'", s)))
        .collect()
}

fn print_help() {
    println!(
        r#"memeclip - CLIP embeddings and recommendations for a meme folder

USAGE:
    memeclip embed [DIR] [OPTIONS]        Embed every image in DIR (default: data/memes)
    memeclip like INDEX                   Record a like for the meme at INDEX
    memeclip skip INDEX                   Record a skip (takes back a like)
    memeclip status                       Print collection size and like count as JSON
    memeclip preference [--likes LIST]    Print the preference vector as JSON
    memeclip recommend [--likes LIST]     Print the top matches as JSON

OPTIONS:
    --config, -c PATH     Path to config file
    --data, -d DIR        Directory for embeddings.npy, embeddings.csv, meme_paths.json, likes.json
    --device DEVICE       auto, cpu or cuda (embed)
    --skip-undecodable    Skip files that fail to decode instead of aborting (embed)
    --likes, -l LIST      Comma-separated liked indices, e.g. 0,3,5 (default: stored likes)
    --normalize           Scale the preference vector to unit length
    --no-normalize        Use the raw mean (default from config: normalize)
    --top-k, -k N         Number of recommendations (default from config: 10)
    --exclude-liked       Leave liked memes out of recommendations
    --csv                 Read embeddings from the CSV file instead of .npy
    --version, -V         Show version
    --help, -h            Show this help message

ENVIRONMENT:
    MEMECLIP_CONFIG       Path to config file (overrides default location)
    MEMECLIP_LOG          Log level (trace, debug, info, warn, error)
    ORT_DYLIB_PATH        Path to the ONNX Runtime shared library

Config file location: $XDG_CONFIG_HOME/memeclip/config.toml"#
    );
}

fn main() -> Result<()> {
    let cli = parse_args();

    match cli.command {
        Command::Help => {
            print_help();
            return Ok(());
        }
        Command::Version => {
            println!("memeclip {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    if let Err(e) = logging::init(None) {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    let mut config = match cli.config_path {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = cli.data_dir {
        config.output.data_dir = dir;
    }
    let layout = ArtifactLayout::from_config(&config.output);

    match cli.command {
        Command::Embed {
            directory,
            device,
            skip_undecodable,
        } => {
            if skip_undecodable {
                config.scanner.decode_policy = DecodePolicy::SkipAndWarn;
            }
            run_embed(&config, &layout, &directory, device)
        }
        Command::Preference {
            likes,
            normalize,
            source,
        } => {
            let likes = resolve_likes(likes, &layout)?;
            let set = store::load(&layout, source)
                .with_context(|| format!("Failed to load embeddings from {:?}", config.output.data_dir))?;
            let pref = compute_preference(
                &likes,
                set.vectors(),
                normalize.unwrap_or(config.recommend.normalize),
            )?;
            println!("{}", serde_json::to_string(&pref)?);
            Ok(())
        }
        Command::Recommend {
            likes,
            normalize,
            top_k,
            exclude_liked,
            source,
        } => {
            let likes = resolve_likes(likes, &layout)?;
            let recommender = Recommender::load(&layout, source)
                .with_context(|| format!("Failed to load embeddings from {:?}", config.output.data_dir))?;
            let pref = compute_preference(
                &likes,
                recommender.embeddings().vectors(),
                normalize.unwrap_or(config.recommend.normalize),
            )?;

            let top_k = top_k.unwrap_or(config.recommend.top_k);
            let recs = if exclude_liked {
                let exclude: HashSet<usize> = likes.iter().map(|&i| i as usize).collect();
                recommender.recommend_excluding(&pref, top_k, &exclude)
            } else {
                recommender.recommend(&pref, top_k)
            };

            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({ "recommendations": recs }))?
            );
            Ok(())
        }
        Command::Feedback { action, index } => run_feedback(&layout, action, index),
        Command::Status => {
            let status = feedback::status(&layout)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Command::Help | Command::Version => Ok(()),
    }
}

fn run_embed(
    config: &Config,
    layout: &ArtifactLayout,
    directory: &Path,
    device: Option<DevicePreference>,
) -> Result<()> {
    let directory = directory
        .canonicalize()
        .with_context(|| format!("Image folder {} not found", directory.display()))?;

    let model = ClipModel::new(config.model.clone());
    let device = model.initialize(device)?;
    println!("Embedding images in {} on {}", directory.display(), device);

    let (tx, rx) = mpsc::channel();
    let reporter = thread::spawn(move || {
        for progress in rx {
            match progress {
                EmbedProgress::Embedding { current, total, path } => {
                    eprintln!("[{}/{}] {}", current, total, path);
                }
                EmbedProgress::Skipped { path, message } => {
                    eprintln!("Skipped {}: {}", path, message);
                }
                EmbedProgress::Started { .. } | EmbedProgress::Completed { .. } => {}
            }
        }
    });

    let result = Pipeline::new(config.scanner.clone()).embed_folder(&model, &directory, Some(tx));
    let _ = reporter.join();
    let run = result?;

    if feedback::forget_if_collection_changed(layout, run.set.identifiers())? {
        println!("Collection changed, stored likes cleared");
    }
    store::save(&run.set, layout)?;
    info!(count = run.set.len(), skipped = run.skipped.len(), "Embedding run finished");
    println!("Saved {} embeddings", run.set.len());
    if !run.skipped.is_empty() {
        println!("Skipped {} undecodable files", run.skipped.len());
    }

    Ok(())
}

/// Likes from the command line, or the stored ones when none were given
fn resolve_likes(likes: Option<Vec<i64>>, layout: &ArtifactLayout) -> Result<Vec<i64>> {
    match likes {
        Some(likes) => Ok(likes),
        None => Ok(LikeStore::load(&layout.likes)?.liked_indices()),
    }
}

fn run_feedback(layout: &ArtifactLayout, action: Feedback, index: i64) -> Result<()> {
    let total = store::read_paths(&layout.paths)
        .with_context(|| {
            format!(
                "No embeddings at {}; run `memeclip embed` first",
                layout.paths.display()
            )
        })?
        .len();

    let mut likes = LikeStore::load(&layout.likes)?;
    if likes.record(action, index, total)? {
        likes.save(&layout.likes)?;
    }
    info!(?action, index, liked = likes.liked().len(), "Recorded feedback");

    println!(
        "{}",
        serde_json::to_string(&serde_json::json!({
            "status": "ok",
            "liked_count": likes.liked().len(),
        }))?
    );
    Ok(())
}
