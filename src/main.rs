use adinsight::backend::{AskRequest, ExampleEngine, RetrievalEngine, TextToSql};
use adinsight::compare::compare;
use adinsight::config::Config;
use adinsight::execution::ExecutionEngine;
use adinsight::exemplars::ExemplarStore;
use adinsight::insights::batch::BatchDriver;
use adinsight::insights::cache::InsightCache;
use adinsight::insights::generator::InsightGenerator;
use adinsight::llm::GeminiClient;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "adinsight")]
#[command(about = "Natural-language analytics queries and cached insights")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Google API key (or set GOOGLE_API_KEY env var)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Directory holding the analytics table files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendKind {
    Retrieval,
    Example,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the selected backend's knowledge base from scratch
    Train {
        #[arg(long, value_enum, default_value = "example")]
        backend: BackendKind,
    },
    /// Ask a natural-language question
    Ask {
        question: String,
        /// Scope the question to one company
        #[arg(long)]
        entity: Option<String>,
        #[arg(long, value_enum, default_value = "retrieval")]
        backend: BackendKind,
    },
    /// Run the same question through both backends
    Compare {
        question: String,
        #[arg(long)]
        entity: Option<String>,
    },
    /// List the example engine's training data
    ViewTraining,
    /// Generate cached insights for one entity, or all of them
    Insights {
        /// Company name, or "all"
        entity: String,
        /// Regenerate even when a fresh cached insight exists
        #[arg(long)]
        force: bool,
    },
}

struct Context {
    config: Config,
    llm: Arc<GeminiClient>,
    engine: ExecutionEngine,
}

impl Context {
    fn build(args: &Args) -> Result<Self> {
        let config = Config::resolve(args.api_key.clone(), args.data_dir.clone())?;
        let llm = Arc::new(GeminiClient::new(
            config.api_key.clone(),
            config.model.clone(),
            config.temperature,
        ));
        let engine = ExecutionEngine::new(config.data_dir.clone());
        info!(
            "Initialized with model={}, temperature={}",
            config.model, config.temperature
        );
        Ok(Self {
            config,
            llm,
            engine,
        })
    }

    fn retrieval_engine(&self) -> RetrievalEngine {
        RetrievalEngine::new(self.llm.clone(), self.engine.clone())
    }

    fn example_engine(&self) -> Result<ExampleEngine> {
        let store = ExemplarStore::open(&self.config.training_db)?;
        Ok(ExampleEngine::new(
            self.llm.clone(),
            self.engine.clone(),
            store,
        ))
    }

    fn insight_cache(&self) -> Result<InsightCache> {
        Ok(InsightCache::open(
            &self.config.cache_db,
            self.config.insights_dir.clone(),
        )?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let ctx = Context::build(&args)?;

    match &args.command {
        Command::Train { backend } => {
            match backend {
                BackendKind::Retrieval => ctx.retrieval_engine().train().await?,
                BackendKind::Example => ctx.example_engine()?.train().await?,
            }
            println!("Training completed");
        }
        Command::Ask {
            question,
            entity,
            backend,
        } => {
            let request = AskRequest::new(question.clone()).with_entity(entity.clone());
            let response = match backend {
                BackendKind::Retrieval => ctx.retrieval_engine().ask(&request).await?,
                BackendKind::Example => ctx.example_engine()?.ask(&request).await?,
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Compare { question, entity } => {
            let request = AskRequest::new(question.clone()).with_entity(entity.clone());
            let retrieval = ctx.retrieval_engine();
            let example = ctx.example_engine()?;
            let comparison = compare(&retrieval, &example, &request).await;
            println!("{}", serde_json::to_string_pretty(&comparison)?);
        }
        Command::ViewTraining => {
            let items = ctx.example_engine()?.training_data()?;
            if items.is_empty() {
                println!("No training data. Run 'adinsight train' first.");
            } else {
                println!("{}", serde_json::to_string_pretty(&items)?);
            }
        }
        Command::Insights { entity, force } => {
            let cache = ctx.insight_cache()?;
            if entity.eq_ignore_ascii_case("all") {
                let driver = BatchDriver::new(ctx.llm.as_ref(), &ctx.engine, &cache);
                let summary = driver.run(*force).await?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
                if !summary.all_succeeded() {
                    std::process::exit(1);
                }
            } else {
                let generator = InsightGenerator::new(ctx.llm.as_ref(), &ctx.engine, &cache);
                let insight = generator.generate(entity, *force).await?;
                println!("{}", insight);
            }
        }
    }

    Ok(())
}
