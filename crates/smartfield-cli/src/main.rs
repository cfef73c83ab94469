mod ingest;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use smartfield_ai::stage::DEFAULT_SOURCE_LANGUAGE;
use smartfield_ai::{MarkerGate, OpenAiClient, PipelineRunner, RetryPolicy, StageRunner};
use smartfield_core::{ConfigStore, DerivedFieldSpec, Provider};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "smartfield")]
#[command(version, about = "Derived text fields computed by generative AI providers", long_about = None)]
struct Cli {
    /// Directory holding configs.json and the provider configuration files
    #[arg(long, env = "SMARTFIELD_CONFIG_DIR", default_value = "configs", global = true)]
    config_dir: PathBuf,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// OpenAI-compatible base URL (default: https://api.openai.com/v1)
    #[arg(long, env = "OPENAI_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Per-call timeout in seconds
    #[arg(long, env = "SMARTFIELD_TIMEOUT_SECS", default_value_t = 60, global = true)]
    timeout_secs: u64,

    /// Attempts per provider call, including the first
    #[arg(long, env = "SMARTFIELD_MAX_ATTEMPTS", default_value_t = 3, global = true)]
    max_attempts: u32,

    /// Language of the input texts
    #[arg(long, env = "SMARTFIELD_SOURCE_LANGUAGE", default_value = DEFAULT_SOURCE_LANGUAGE, global = true)]
    source_language: String,

    /// Require both `Text:` and `Result:` markers in provider output
    #[arg(long, global = true)]
    strict_marker: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the configuration directory and list what it provides
    Init,

    /// Run a derived-field pipeline on one text
    Derive {
        /// Source text
        #[arg(long)]
        text: String,

        #[arg(long)]
        spell_correct: bool,

        #[arg(long)]
        summarize: bool,

        #[arg(long)]
        translate: bool,

        /// Target language, required with --translate
        #[arg(long)]
        target_lang: Option<String>,

        #[arg(long)]
        emojify: bool,

        /// Generate a title from the (stage-processed) text
        #[arg(long)]
        generate_title: bool,

        /// Maximum title length in characters, with --generate-title
        #[arg(long, value_name = "CHARS")]
        max_title_length: Option<usize>,

        /// Provider code (OPAI, STBAI, GCP, AZC, AWS)
        #[arg(long, default_value = "OPAI")]
        provider: Provider,
    },

    /// Materialize and store records of a declared record type
    Ingest {
        /// Record type declaration (JSON)
        #[arg(long, value_name = "JSON")]
        schema: PathBuf,

        /// Records to ingest (JSON array of objects)
        #[arg(long, value_name = "JSON")]
        records: PathBuf,

        /// Persist into this directory instead of memory
        #[arg(long, value_name = "DIR")]
        db: Option<PathBuf>,

        /// Fail on the first derived field that cannot be computed
        #[arg(long)]
        strict: bool,
    },
}

impl Cli {
    fn load_configs(&self) -> anyhow::Result<ConfigStore> {
        ConfigStore::load_dir(&self.config_dir)
            .with_context(|| format!("loading configuration from {}", self.config_dir.display()))
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            timeout: Duration::from_secs(self.timeout_secs),
            ..RetryPolicy::default()
        }
    }

    fn marker_gate(&self) -> MarkerGate {
        if self.strict_marker {
            MarkerGate::Strict
        } else {
            MarkerGate::Lenient
        }
    }

    /// Stage runner with the OpenAI adapter wired in.
    fn stage_runner(&self, store: ConfigStore) -> anyhow::Result<StageRunner> {
        let api_key = self
            .api_key
            .clone()
            .context("an API key is required: pass --api-key or set OPENAI_API_KEY")?;
        let mut client = OpenAiClient::new(api_key)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .context("building HTTP client")?;
        if let Some(base_url) = &self.base_url {
            client = client.with_base_url(base_url.as_str());
        }

        Ok(StageRunner::new(Arc::new(store))
            .with_adapter(Provider::OpenAi, Arc::new(client))
            .with_retry(self.retry_policy())
            .with_marker_gate(self.marker_gate())
            .with_source_language(self.source_language.as_str()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    info!("smartfield v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Command::Init => cmd_init(&cli),
        Command::Derive {
            text,
            spell_correct,
            summarize,
            translate,
            target_lang,
            emojify,
            generate_title,
            max_title_length,
            provider,
        } => {
            let mut builder = DerivedFieldSpec::builder(["text"])
                .translate(*translate)
                .provider(*provider);
            if *spell_correct {
                builder = builder.spell_correct();
            }
            if *summarize {
                builder = builder.summarize();
            }
            if let Some(lang) = target_lang {
                builder = builder.target_lang(lang.as_str());
            }
            if *emojify {
                builder = builder.emojify();
            }
            if *generate_title {
                builder = builder.generate_title();
            }
            if let Some(max) = max_title_length {
                builder = builder.max_title_length(*max);
            }
            let spec = builder.build().context("invalid derived-field declaration")?;
            cmd_derive(&cli, &spec, text).await
        }
        Command::Ingest {
            schema,
            records,
            db,
            strict,
        } => {
            let runner = cli.stage_runner(cli.load_configs()?)?;
            let opts = ingest::IngestOptions {
                schema_path: schema,
                records_path: records,
                db_dir: db.as_deref(),
                strict: *strict,
            };
            let stats = ingest::run_ingest(PipelineRunner::new(runner), &opts).await?;
            eprintln!(
                "Ingested {} record(s) into '{}' ({} derived value(s) unset)",
                stats.ingested, stats.record_type, stats.unset
            );
            Ok(())
        }
    }
}

fn cmd_init(cli: &Cli) -> anyhow::Result<()> {
    let store = cli.load_configs()?;
    for config in store.provider_configs() {
        let tasks: Vec<&str> = config.tasks.keys().map(String::as_str).collect();
        println!(
            "{:<24} {:<6} {}",
            config.name,
            config.provider.code(),
            tasks.join(", ")
        );
    }
    println!(
        "{} provider configuration(s) loaded from {}",
        store.len(),
        cli.config_dir.display()
    );
    Ok(())
}

async fn cmd_derive(cli: &Cli, spec: &DerivedFieldSpec, text: &str) -> anyhow::Result<()> {
    if !spec.calls_provider() {
        debug!("nothing enabled, text passes through");
        println!("{text}");
        return Ok(());
    }

    let pipeline = PipelineRunner::new(cli.stage_runner(cli.load_configs()?)?);
    let run = pipeline
        .run(spec, text)
        .await
        .context("running derived-field pipeline")?;

    for stage in &run.stages {
        debug!(
            task = %stage.task,
            input = %stage.input,
            output = %stage.output,
            fell_back = stage.fell_back,
            "stage"
        );
    }
    if let Some(title) = &run.title {
        debug!(fell_back = title.fell_back, output = %title.output, "title");
    }
    println!("{}", run.output());
    Ok(())
}
