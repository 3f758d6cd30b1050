use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use marketflow::config::Config;
use marketflow::logging;
use marketflow::pipeline::{descriptions_to_csv, Collaborators, Pipeline, StageOutcome, VisualHints};
use marketflow::prompts::PromptSet;
use marketflow::rest;
use marketflow::session::{Confirmation, StageOutput};
use marketflow::topics::{csv, Topic};
use marketflow::workflow::Stage;

#[derive(Parser)]
#[command(name = "marketflow")]
#[command(about = "Content-marketing pipeline: topic to blog, SEO, visuals, social and CMS")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the topics in a CSV file
    Topics {
        /// Topic CSV (id, title, contentBrief, visualBrief)
        csv: PathBuf,
    },

    /// Generate topic ideas for a keyword
    Amplify {
        keyword: String,

        /// Write the candidates to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the pipeline for one topic
    Run {
        /// Topic CSV (id, title, contentBrief, visualBrief)
        csv: PathBuf,

        /// Topic id (default: first topic in the file)
        #[arg(short, long)]
        topic: Option<String>,

        /// Last stage to run (blog, seo, visual, social, cms)
        #[arg(long, default_value = "cms")]
        through: Stage,

        /// Scene direction for the visual stage
        #[arg(long)]
        scene: Option<String>,

        /// Body-language direction for the visual stage
        #[arg(long)]
        body_language: Option<String>,

        /// Write the visual descriptions to this CSV file
        #[arg(long)]
        visuals_csv: Option<PathBuf>,

        /// Skip the confirmation prompt before publishing
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Normalize a topic CSV, or append it to the configured spreadsheet
    Export {
        /// Topic CSV to export
        csv: PathBuf,

        /// Append rows to the topic spreadsheet instead of printing CSV
        #[arg(long)]
        sheet: bool,
    },

    /// Start the REST API server
    Api {
        /// Port to listen on (default: from config)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;

    let is_server_mode = matches!(cli.command, Commands::Api { .. });
    let _logging = logging::init_logging(&config, is_server_mode, cli.debug)?;

    match cli.command {
        Commands::Topics { csv } => cmd_topics(&csv)?,
        Commands::Amplify { keyword, output } => cmd_amplify(config, &keyword, output).await?,
        Commands::Run {
            csv,
            topic,
            through,
            scene,
            body_language,
            visuals_csv,
            yes,
        } => {
            let hints = VisualHints {
                scene,
                body_language,
            };
            cmd_run(config, &csv, topic, through, hints, visuals_csv, yes).await?;
        }
        Commands::Export { csv, sheet } => cmd_export(config, &csv, sheet).await?,
        Commands::Api { port } => cmd_api(config, port).await?,
    }

    Ok(())
}

fn build_pipeline(config: Config) -> Result<Pipeline> {
    let prompts = PromptSet::load(config.prompts_path().as_deref())
        .context("Failed to load prompt templates")?;
    let collaborators =
        Collaborators::from_config(&config).context("Failed to configure collaborators")?;
    Ok(Pipeline::new(
        Arc::new(config),
        Arc::new(prompts),
        collaborators,
    ))
}

fn read_topics(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read topic CSV {}", path.display()))
}

fn print_topics(topics: &[Topic]) {
    for topic in topics {
        println!("{:<16} {}", topic.id, topic.title);
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn cmd_topics(path: &Path) -> Result<()> {
    let topics = csv::try_parse_topics(&read_topics(path)?)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    if topics.is_empty() {
        println!("No topics");
        return Ok(());
    }

    println!("Topics ({})", topics.len());
    println!("{}", "─".repeat(60));
    print_topics(&topics);
    Ok(())
}

async fn cmd_amplify(config: Config, keyword: &str, output: Option<PathBuf>) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let result = pipeline.amplify(keyword).await?;

    println!("Candidates for '{}' ({})", keyword, result.candidates.len());
    println!("{}", "─".repeat(60));
    print_topics(&result.candidates);
    if result.rejected > 0 {
        println!("{} malformed entries skipped", result.rejected);
    }

    if let Some(path) = output {
        std::fs::write(&path, csv::serialize_topics(&result.candidates)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}

fn summarize(output: &StageOutput) -> String {
    match output {
        StageOutput::Blog(blog) => format!("{} blocks", blog.blocks.len()),
        StageOutput::Seo(seo) => format!("\"{}\" [{}]", seo.meta_title, seo.keywords.join(", ")),
        StageOutput::Visual(visual) => format!(
            "{} descriptions, {}",
            visual.descriptions.len(),
            if visual.image.is_placeholder() {
                "no image"
            } else {
                "image ready"
            }
        ),
        StageOutput::Social(posts) => format!("twitter: {}", posts.twitter),
        StageOutput::Publish(receipt) => format!("document {}", receipt.document_id),
    }
}

async fn cmd_run(
    config: Config,
    path: &Path,
    topic: Option<String>,
    through: Stage,
    hints: VisualHints,
    visuals_csv: Option<PathBuf>,
    skip_confirm: bool,
) -> Result<()> {
    if through == Stage::Topic {
        bail!("--through must be a stage after topic");
    }

    let pipeline = build_pipeline(config)?;
    let raw = read_topics(path)?;

    let title = {
        let mut session = pipeline.session().lock().await;
        if session.import_topics(&raw, Confirmation::Confirmed).loaded() == 0 {
            bail!("No topics found in {}", path.display());
        }
        let id = match topic {
            Some(id) => id,
            None => session.topics().topics()[0].id.clone(),
        };
        session.select_topic(&id, Confirmation::Confirmed)?;
        session.active_topic()?.title.clone()
    };

    println!("Topic: {title}");
    println!("{}", "─".repeat(60));

    let stages = Stage::ALL
        .into_iter()
        .filter(|s| *s != Stage::Topic && s.index() <= through.index());

    for stage in stages {
        if stage == Stage::Cms && !skip_confirm && !confirm("Publish to the CMS?")? {
            println!("Cancelled before publishing");
            break;
        }

        match pipeline.run_stage(stage, hints.clone()).await? {
            StageOutcome::Completed { output } => {
                println!("{:<8} done      {}", stage, summarize(&output));
            }
            StageOutcome::Fallback { placeholder, error } => {
                println!("{:<8} failed    {}", stage, error);
                println!("{:<8} showing   {}", "", summarize(&placeholder));
                println!("Later stages need '{stage}'; rerun once the collaborator recovers");
                break;
            }
        }
    }

    let session = pipeline.session().lock().await;
    if let Some(blog) = session.blog() {
        println!();
        println!("{}", blog.markdown);
    }
    if let (Some(path), Some(visual)) = (visuals_csv, session.visual()) {
        std::fs::write(&path, descriptions_to_csv(&visual.descriptions)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Visual descriptions saved to {}", path.display());
    }

    Ok(())
}

async fn cmd_export(config: Config, path: &Path, sheet: bool) -> Result<()> {
    let raw = read_topics(path)?;

    if !sheet {
        let topics = csv::try_parse_topics(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        print!("{}", csv::serialize_topics(&topics)?);
        return Ok(());
    }

    let pipeline = build_pipeline(config)?;
    pipeline
        .session()
        .lock()
        .await
        .import_topics(&raw, Confirmation::Confirmed);
    let exported = pipeline.export_topics_to_sheet().await?;
    println!("Appended {exported} topics to the spreadsheet");
    Ok(())
}

async fn cmd_api(config: Config, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.rest_api.port);

    println!("Starting REST API server...");
    println!("  Port: {}", port);
    println!("  Endpoints:");
    println!("    GET  /api/v1/health                 Health check");
    println!("    GET  /api/v1/status                 Pipeline summary");
    println!("    POST /api/v1/topics/import          Load topics from CSV");
    println!("    PUT  /api/v1/topics/:id/select      Select a topic");
    println!("    POST /api/v1/topics/amplify         Generate topic ideas");
    println!("    POST /api/v1/stages/:stage/run      Run a stage");
    println!("    POST /api/v1/stages/:stage/reset    Reset a stage and its successors");
    println!("    DELETE /api/v1/topics/candidates    Discard pending candidates");
    println!("    GET  /api/v1/session                Session snapshot");
    println!("    GET  /swagger-ui                    API documentation");
    println!();

    let state = rest::ApiState::new(build_pipeline(config)?);
    rest::serve(state, port).await?;

    Ok(())
}
