use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use redteam_kit::config::Provider;
use redteam_kit::{
    findings, submission, BatchOptions, CompletionClient, Config, GenerateOptions,
    ModelResponse, UsageStats,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "redteam-kit")]
#[command(about = "Prompt runner and submission packager for model red-teaming", long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use the offline echo provider instead of the configured endpoint
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a single prompt to the model
    Generate {
        /// Prompt text
        #[arg(long)]
        prompt: String,

        /// Optional system prompt
        #[arg(long)]
        system: Option<String>,

        /// Cache key for reproducible replays
        #[arg(long)]
        cache_key: Option<String>,

        #[arg(long)]
        temperature: Option<f32>,

        #[arg(long)]
        max_tokens: Option<u32>,

        /// Load cached responses before running
        #[arg(long, value_name = "FILE")]
        import_cache: Option<PathBuf>,

        /// Save cached responses after running
        #[arg(long, value_name = "FILE")]
        export_cache: Option<PathBuf>,
    },

    /// Run every prompt of a JSON Lines file
    Batch {
        /// One JSON string or message array per line
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        #[arg(long)]
        system: Option<String>,

        /// Prompts per group (defaults to batch.batch_size)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Cache each slot under its batch position
        #[arg(long)]
        use_cache: bool,

        /// Write responses as a JSON array instead of printing them
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,

        #[arg(long, value_name = "FILE")]
        import_cache: Option<PathBuf>,

        #[arg(long, value_name = "FILE")]
        export_cache: Option<PathBuf>,
    },

    /// Validate findings files
    Validate {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// Build a submission package from a writeup and findings files
    Package {
        /// Markdown writeup
        #[arg(long, value_name = "FILE")]
        writeup: PathBuf,

        /// Package directory (defaults to submission.output_dir)
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,

        #[arg(value_name = "FINDINGS", required = true)]
        findings: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if cli.dry_run {
        config.llm.provider = Provider::Echo;
    }

    // Initialize logging
    init_logging(&config.logging.level, &config.logging.format)?;

    match cli.command {
        Commands::Generate {
            prompt,
            system,
            cache_key,
            temperature,
            max_tokens,
            import_cache,
            export_cache,
        } => {
            let mut client = CompletionClient::new(config.llm.clone())?;
            if let Some(path) = &import_cache {
                client.import_cache(path)?;
            }

            let options = GenerateOptions {
                system_prompt: system,
                temperature,
                max_tokens,
                cache_key,
                ..Default::default()
            };
            let response = client.generate(prompt, options).await?;
            println!("{}", serde_json::to_string_pretty(response.as_ref())?);

            if let Some(path) = &export_cache {
                client.export_cache(path)?;
            }
            print_usage(&client.get_usage_stats())?;
        }
        Commands::Batch {
            input,
            system,
            batch_size,
            use_cache,
            output,
            import_cache,
            export_cache,
        } => {
            let prompts = redteam_kit::load_prompts(&input)?;
            let mut client = CompletionClient::new(config.llm.clone())?;
            if let Some(path) = &import_cache {
                client.import_cache(path)?;
            }

            let options = BatchOptions {
                system_prompt: system,
                batch_size: batch_size.unwrap_or(config.batch.batch_size),
                use_cache,
                ..Default::default()
            };
            let responses = client.batch_generate(prompts, &options).await;

            let failed = responses.iter().filter(|r| r.is_error()).count();
            if failed > 0 {
                tracing::warn!("{} of {} prompts failed", failed, responses.len());
            }

            let rendered: Vec<&ModelResponse> = responses.iter().map(|r| r.as_ref()).collect();
            let json = serde_json::to_string_pretty(&rendered)?;
            match &output {
                Some(path) => write_output(path, &json)?,
                None => println!("{}", json),
            }

            if let Some(path) = &export_cache {
                client.export_cache(path)?;
            }
            print_usage(&client.get_usage_stats())?;
        }
        Commands::Validate { files } => {
            let report = findings::validate_files(&files);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.summary.validation_passed {
                std::process::exit(1);
            }
        }
        Commands::Package {
            writeup,
            output,
            findings,
        } => {
            let writeup_text = fs::read_to_string(&writeup)
                .with_context(|| format!("Failed to read writeup: {}", writeup.display()))?;
            let output_dir =
                output.unwrap_or_else(|| PathBuf::from(&config.submission.output_dir));

            let package = submission::export_package(
                &findings,
                &writeup_text,
                &output_dir,
                &config.submission.competition,
            )?;
            println!("Submission package created: {}", package.root.display());
        }
    }

    Ok(())
}

fn write_output(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents)
        .with_context(|| format!("Failed to write output file: {}", path.display()))
}

fn print_usage(stats: &UsageStats) -> Result<()> {
    eprintln!("{}", serde_json::to_string_pretty(stats)?);
    Ok(())
}

fn init_logging(level: &str, format: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        "compact" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            // Default to pretty
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
