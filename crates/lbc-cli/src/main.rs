use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use lbc_client::cache::SubmissionCache;
use lbc_client::config::{default_config_path, Config, DEFAULT_BASE_URL, DEFAULT_CHALLENGE_ID};
use lbc_client::{Client, ClientOptions, SubmissionResult, TargetImage, Trace};
use lbc_core::codec;
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lbc", version, about = "Submit traced experiments to the biocompute service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store credentials in ~/.lbc/config.toml after checking them.
    Login {
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        challenge_id: Option<String>,
        #[arg(long)]
        json: bool,
    },
    Logout {
        #[arg(long)]
        json: bool,
    },
    /// Submit a protocol file (JSON or YAML) and wait for the result.
    Submit {
        file: PathBuf,
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long)]
        no_cache: bool,
        #[arg(long)]
        json: bool,
    },
    /// Validate a protocol file offline and summarize it.
    Describe {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    Experiments {
        #[arg(long)]
        json: bool,
    },
    Show {
        experiment_id: String,
        #[arg(long)]
        json: bool,
    },
    Leaderboard {
        #[arg(long)]
        challenge_id: Option<String>,
        #[arg(long)]
        json: bool,
    },
    Target {
        #[arg(long)]
        challenge_id: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    CacheClear {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error(error_code(&err), err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Login {
            api_key,
            base_url,
            challenge_id,
            json,
        } => {
            let path = default_config_path()?;
            let mut config = Config::load_from(&path)?;
            let api_key = match api_key {
                Some(key) => key,
                None => prompt("API key", None)?,
            };
            if api_key.trim().is_empty() {
                return Err(anyhow!("an API key is required"));
            }
            config.api_key = Some(api_key.trim().to_string());
            config.base_url = match (base_url, config.base_url.take()) {
                (Some(url), _) | (None, Some(url)) => Some(url),
                (None, None) => Some(prompt("Server URL", Some(DEFAULT_BASE_URL))?),
            };
            config.challenge_id = match (challenge_id, config.challenge_id.take()) {
                (Some(id), _) | (None, Some(id)) => Some(id),
                (None, None) => Some(prompt("Challenge ID", Some(DEFAULT_CHALLENGE_ID))?),
            };
            let user = Client::new(config.client_options()?)?.user()?;
            let path = config.save()?;
            let name = user_name(&user);
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "login",
                    "user": user,
                    "config_path": path.display().to_string()
                })));
            }
            println!("logged_in_as: {}", name);
            println!("base_url: {}", config.base_url());
            println!("config_path: {}", path.display());
        }
        Commands::Logout { json } => {
            let path = default_config_path()?;
            let removed = Config::remove()?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "logout",
                    "removed": removed
                })));
            }
            if removed {
                println!("removed: {}", path.display());
            } else {
                println!("not logged in");
            }
        }
        Commands::Submit {
            file,
            timeout,
            no_cache,
            json,
        } => {
            let trace = load_protocol(&file)?;
            let mut options = Config::load()?.client_options()?;
            if let Some(secs) = timeout {
                options.poll = options.poll.with_timeout(Duration::from_secs(secs));
            }
            if !no_cache {
                options = options.with_cache_dir(SubmissionCache::default_dir()?);
            }
            let client = Client::new(options)?;
            let result = client.submit(trace)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "submit",
                    "challenge_id": client.challenge_id(),
                    "result": result_to_json(&result)
                })));
            }
            print_result(&result);
        }
        Commands::Describe { file, json } => {
            let trace = load_protocol(&file)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "file": file.display().to_string(),
                    "well_count": trace.well_count(),
                    "op_count": trace.op_count(),
                    "trace": codec::encode(&trace)
                })));
            }
            println!("file: {}", file.display());
            println!("well_count: {}", trace.well_count());
            println!("op_count: {}", trace.op_count());
            for well in trace.wells() {
                let ops: Vec<String> = well.ops().iter().map(|op| op.to_string()).collect();
                println!("well {}: {}", well.index(), ops.join(" -> "));
            }
        }
        Commands::Experiments { json } => {
            let experiments = client_from_config()?.list_experiments()?;
            if json {
                let rows: Vec<Value> = experiments.iter().map(|e| e.raw.clone()).collect();
                return Ok(Some(json!({
                    "ok": true,
                    "command": "experiments",
                    "experiments": rows
                })));
            }
            if experiments.is_empty() {
                println!("no experiments");
            }
            for experiment in &experiments {
                println!("{}  {}", experiment.experiment_id, experiment.status);
            }
        }
        Commands::Show {
            experiment_id,
            json,
        } => {
            let experiment = client_from_config()?.get_experiment(&experiment_id)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "show",
                    "experiment": experiment
                })));
            }
            println!("{}", serde_json::to_string_pretty(&experiment)?);
        }
        Commands::Leaderboard { challenge_id, json } => {
            let client = client_from_config()?;
            let challenge_id = challenge_id.unwrap_or_else(|| client.challenge_id().to_string());
            let entries = client.leaderboard(&challenge_id)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "leaderboard",
                    "challenge_id": challenge_id,
                    "entries": entries
                })));
            }
            println!("challenge_id: {}", challenge_id);
            for entry in &entries {
                let score = entry
                    .best_score
                    .map(|s| format!("{:.4}", s))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:>4}  {:<24} score={} wells={}",
                    entry.rank, entry.user_name, score, entry.wells_consumed
                );
            }
        }
        Commands::Target {
            challenge_id,
            out,
            json,
        } => {
            let client = client_from_config()?;
            let challenge_id = challenge_id.unwrap_or_else(|| client.challenge_id().to_string());
            let target = client.target(&challenge_id)?;
            let written = match (&out, target.decode_bytes()?) {
                (Some(path), Some(bytes)) => {
                    std::fs::write(path, &bytes)
                        .with_context(|| format!("writing {}", path.display()))?;
                    Some(path.display().to_string())
                }
                _ => None,
            };
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "target",
                    "challenge_id": challenge_id,
                    "target": target,
                    "written_to": written
                })));
            }
            match (&target, written) {
                (_, Some(path)) => println!("written_to: {}", path),
                (TargetImage::Url(url), None) => println!("image_url: {}", url),
                (TargetImage::Base64(data), None) => {
                    println!("image_base64: {} chars (pass --out to save)", data.len())
                }
            }
        }
        Commands::CacheClear { json } => {
            let cache = SubmissionCache::new(SubmissionCache::default_dir()?);
            let removed = cache.clear()?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "cache-clear",
                    "removed": removed,
                    "cache_dir": cache.dir().display().to_string()
                })));
            }
            println!("removed: {}", removed);
        }
    }
    Ok(None)
}

fn client_from_config() -> Result<Client> {
    let options: ClientOptions = Config::load()?.client_options()?;
    Ok(Client::new(options)?)
}

/// Asks on stderr so stdout stays machine-readable. An empty answer takes
/// `default` when there is one.
fn prompt(label: &str, default: Option<&str>) -> Result<String> {
    let mut stderr = io::stderr();
    match default {
        Some(value) => write!(stderr, "{} [{}]: ", label, value)?,
        None => write!(stderr, "{}: ", label)?,
    }
    stderr.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(answer_or_default(&line, default))
}

fn answer_or_default(line: &str, default: Option<&str>) -> String {
    match (line.trim(), default) {
        ("", Some(value)) => value.to_string(),
        (answer, _) => answer.to_string(),
    }
}

fn user_name(user: &Value) -> String {
    ["name", "user_name", "email", "id"]
        .iter()
        .find_map(|key| user.get(*key))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Reads a protocol file in the submission payload shape. `.yaml`/`.yml`
/// files are parsed as YAML, everything else as JSON.
fn load_protocol(path: &Path) -> Result<Trace> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    );
    let payload: Value = if is_yaml {
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
    } else {
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
    };
    let trace = codec::decode(&payload)?;
    debug!(
        file = %path.display(),
        wells = trace.well_count(),
        ops = trace.op_count(),
        "loaded protocol"
    );
    Ok(trace)
}

fn result_to_json(result: &SubmissionResult) -> Value {
    json!({
        "experiment_id": result.experiment_id,
        "status": result.status,
        "error": result.error,
        "score": result.score(),
        "duration_seconds": result.duration_seconds(),
        "result_data": result.result_data
    })
}

fn print_result(result: &SubmissionResult) {
    println!("experiment_id: {}", result.experiment_id);
    println!("status: {}", result.status.as_str());
    if let Some(error) = &result.error {
        println!("error: {}", error);
    }
    if let Some(score) = result.score() {
        println!("score: {:.4}", score);
    }
    println!("duration_seconds: {:.1}", result.duration_seconds());
    let images = result.well_images();
    if !images.is_empty() {
        println!("well_images: {}", images.len());
    }
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn error_code(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<lbc_core::Error>()
        .map(lbc_core::Error::kind)
        .unwrap_or("command_failed")
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Login { json, .. }
        | Commands::Logout { json }
        | Commands::Submit { json, .. }
        | Commands::Describe { json, .. }
        | Commands::Experiments { json }
        | Commands::Show { json, .. }
        | Commands::Leaderboard { json, .. }
        | Commands::Target { json, .. }
        | Commands::CacheClear { json } => *json,
    }
}
