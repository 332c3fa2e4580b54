//! Mirror CLI
//!
//! Runs skin analysis and makeup try-on against the vision provider, or
//! serves the HTTP/WebSocket API for the presentation layer.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mirror_orchestrator::{
    create_router, AnalysisResult, AppState, ApplyMode, CancellationToken, Config,
    EffectRequest, Finish, ImageAsset, MakeupCategory, MirrorError, Orchestrator,
};
use mirror_report::{json::JsonGenerator, MarkdownGenerator, ReportInput, SkinReport};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// Mirror - AI skin analysis and virtual makeup try-on
#[derive(Parser, Debug)]
#[command(name = "mirror")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: mirror.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze skin in a face image and write a report
    Analyze {
        /// Path to a JPEG, PNG or WebP image
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Output directory for reports
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output_dir: PathBuf,

        /// Print the result without writing report files
        #[arg(long)]
        no_report: bool,
    },

    /// Apply makeup effects to a face image
    Apply {
        /// Path to a JPEG, PNG or WebP image
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Effect as category:#color:intensity[:finish], repeatable
        #[arg(short, long = "effect", value_name = "EFFECT", required = true, value_parser = parse_effect)]
        effects: Vec<EffectRequest>,

        /// Submit one task per effect instead of a single batch
        #[arg(long)]
        sequential: bool,
    },

    /// Serve the HTTP and WebSocket API
    Serve {
        /// Port for the HTTP API server
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    print_config(&config);
    let orchestrator = Orchestrator::from_config(config).map_err(|e| anyhow::anyhow!("{e}"))?;

    match args.command {
        Command::Analyze {
            image,
            output_dir,
            no_report,
        } => run_analyze(&orchestrator, &image, &output_dir, no_report).await,
        Command::Apply {
            image,
            effects,
            sequential,
        } => {
            let mode = if sequential {
                ApplyMode::Sequential
            } else {
                orchestrator.config().effects.default_mode
            };
            run_apply(&orchestrator, &image, effects, mode).await
        }
        Command::Serve { port } => run_server(orchestrator, port).await,
    }
}

async fn run_analyze(
    orchestrator: &Orchestrator,
    image_path: &Path,
    output_dir: &Path,
    no_report: bool,
) -> anyhow::Result<()> {
    let image = ImageAsset::load(image_path).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!();
    println!("Analyzing {} ({} bytes)...", image_path.display(), image.len());
    println!("Press Ctrl+C to cancel");

    let cancel = cancel_on_ctrl_c();
    let result = orchestrator
        .analyze_with_cancel(image, &cancel)
        .await
        .map_err(describe_failure)?;

    print_analysis(&result);

    if !no_report {
        generate_reports(&result, image_path, output_dir)?;
    }
    Ok(())
}

async fn run_apply(
    orchestrator: &Orchestrator,
    image_path: &Path,
    effects: Vec<EffectRequest>,
    mode: ApplyMode,
) -> anyhow::Result<()> {
    let image = ImageAsset::load(image_path).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!();
    println!(
        "Applying {} effect(s) to {} ({mode:?})...",
        effects.len(),
        image_path.display()
    );
    println!("Press Ctrl+C to cancel");

    let cancel = cancel_on_ctrl_c();
    let result = orchestrator
        .apply_effects(image, effects, mode, &cancel)
        .await
        .map_err(describe_failure)?;

    println!();
    println!("Result: {}", result.result_asset_url);
    for effect in &result.applied_effects {
        println!(
            "  {} {} at {:.0}%",
            effect.category,
            effect.color,
            effect.intensity * 100.0
        );
    }
    Ok(())
}

async fn run_server(orchestrator: Orchestrator, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    println!();
    println!("Starting HTTP API server on {addr}...");

    let router = create_router(AppState::new(orchestrator));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("HTTP API server running on http://{addr}");
    println!("WebSocket results on ws://{addr}/ws");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    println!("Server stopped");
    Ok(())
}

/// A token cancelled by the first Ctrl+C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!();
            println!("Cancelling...");
            trigger.cancel();
        }
    });
    cancel
}

/// Adds the server-message hint, when one applies.
fn describe_failure(err: MirrorError) -> anyhow::Error {
    match err.hint() {
        mirror_orchestrator::FailureHint::Unknown => anyhow::anyhow!("{err}"),
        hint => anyhow::anyhow!("{err}\n\nSuggestion: {}", hint.message()),
    }
}

/// Parses `category:#color:intensity[:finish]`.
fn parse_effect(value: &str) -> Result<EffectRequest, String> {
    let parts: Vec<&str> = value.split(':').collect();
    let [category, color, intensity, rest @ ..] = parts.as_slice() else {
        return Err(format!(
            "expected category:#color:intensity[:finish], got '{value}'"
        ));
    };

    let intensity: f64 = intensity
        .trim()
        .parse()
        .map_err(|_| format!("intensity '{intensity}' is not a number"))?;
    if !(0.0..=1.0).contains(&intensity) {
        return Err(format!("intensity {intensity} must be between 0 and 1"));
    }

    let mut request = EffectRequest::new(MakeupCategory::parse(category), color.trim(), intensity);
    match rest {
        [] => {}
        [finish] => {
            let finish = Finish::parse(finish)
                .ok_or_else(|| format!("unknown finish '{finish}': use natural, bold or soft"))?;
            request = request.with_finish(finish);
        }
        _ => return Err(format!("too many fields in '{value}'")),
    }
    Ok(request)
}

/// Loads configuration from the given path or the current directory.
fn load_config(config_path: Option<&Path>) -> anyhow::Result<Config> {
    match config_path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Provider: {}", config.api_base_url);
    println!("  Credential env: {}", config.api_key_env);
    println!(
        "  Polling: {} attempts every {}ms",
        config.polling.max_attempts, config.polling.interval_ms
    );
    println!("  Effect mode: {:?}", config.effects.default_mode);
}

fn print_analysis(result: &AnalysisResult) {
    println!();
    println!("Analysis complete:");
    println!("  Overall: {}/100", result.overall);
    println!("  Skin age: {}", result.skin_age);
    println!("  Texture: {}", result.texture);
    println!("  Pores: {}", result.pore);
    println!("  Wrinkles: {}", result.wrinkle);
    println!("  Blemishes: {}", result.blemish);
}

/// Writes Markdown and JSON reports into `output_dir`.
fn generate_reports(
    result: &AnalysisResult,
    image_path: &Path,
    output_dir: &Path,
) -> anyhow::Result<()> {
    println!();
    println!("Generating reports...");

    let image_name = image_path.file_name().map_or_else(
        || "Unknown".to_string(),
        |s| s.to_string_lossy().to_string(),
    );
    let report = SkinReport::new(create_report_input(result, image_name))?;

    std::fs::create_dir_all(output_dir)?;

    let md_path = output_dir.join("mirror-report.md");
    std::fs::write(&md_path, MarkdownGenerator::new(&report).generate())?;
    println!("  Markdown report: {}", md_path.display());

    let json_path = output_dir.join("mirror-report.json");
    JsonGenerator::new(&report).write_to_file(&json_path, true)?;
    println!("  JSON report: {}", json_path.display());

    println!();
    if report.is_all_clear() {
        println!("No focus areas, nice work!");
    } else {
        let areas: Vec<_> = report.focus_areas.iter().map(|f| f.label()).collect();
        println!("Focus areas: {}", areas.join(", "));
    }

    Ok(())
}

fn create_report_input(result: &AnalysisResult, image_name: String) -> ReportInput {
    ReportInput {
        image_name,
        texture: result.texture,
        pore: result.pore,
        wrinkle: result.wrinkle,
        blemish: result.blemish,
        skin_age: result.skin_age,
        overall: result.overall,
        recommendations: result
            .recommendations
            .iter()
            .map(|r| r.message().to_string())
            .collect(),
        analyzed_at: result.analyzed_at,
    }
}
