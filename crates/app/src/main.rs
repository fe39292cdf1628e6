use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use docuquery_core::config::{
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_EMBEDDING_BATCH_SIZE, DEFAULT_MAX_DOCUMENTS,
    DEFAULT_SOURCE_DIR, DEFAULT_TOP_K, EMBEDDING_API_KEY_ENV, LLM_API_KEY_ENV,
};
use docuquery_core::{
    Answer, AnswerGenerator, BuildReport, CharacterNgramEmbedder, ChatCompletionGenerator,
    Credentials, Embedder, ExtractiveGenerator, LopdfExtractor, OpenAiEmbedder,
    ProviderEndpoints, RetrievalError, Session, SessionError, SessionOptions, SessionPhase,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Display;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const TITLE: &str = "DocuQuery using Llama3 and Groq";
const SEPARATOR: &str = "--------------------------------";

#[derive(Parser)]
#[command(name = "docuquery", version, about = "Ask questions against a folder of PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    session: SessionArgs,

    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Args)]
struct SessionArgs {
    /// Folder that contains the PDFs.
    #[arg(long, global = true, env = "DOCUQUERY_SOURCE_DIR", default_value = DEFAULT_SOURCE_DIR)]
    source_dir: PathBuf,

    /// Also pick up PDFs in subfolders.
    #[arg(long, global = true, default_value_t = false)]
    recursive: bool,

    /// Chunk window size in characters.
    #[arg(long, global = true, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(long, global = true, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Maximum number of pages to index.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_DOCUMENTS)]
    max_documents: usize,

    /// Index every page regardless of --max-documents.
    #[arg(long, global = true, default_value_t = false)]
    no_document_cap: bool,

    /// Number of chunks retrieved per question.
    #[arg(long, global = true, env = "DOCUQUERY_TOP_K", default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Skip unreadable PDFs instead of failing the embedding step.
    #[arg(long, global = true, default_value_t = false)]
    skip_unreadable: bool,

    /// Chunks sent per embedding request.
    #[arg(long, global = true, default_value_t = DEFAULT_EMBEDDING_BATCH_SIZE)]
    embedding_batch_size: usize,
}

impl SessionArgs {
    fn to_options(&self) -> SessionOptions {
        SessionOptions {
            source_dir: self.source_dir.clone(),
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            max_documents: (!self.no_document_cap).then_some(self.max_documents),
            top_k: self.top_k,
            recursive: self.recursive,
            skip_unreadable: self.skip_unreadable,
            embedding_batch_size: self.embedding_batch_size,
        }
    }
}

#[derive(Args)]
struct ProviderArgs {
    /// Use a local n-gram embedder and extractive answers; no API keys needed.
    #[arg(long, global = true, default_value_t = false)]
    offline: bool,

    /// API key of the embedding provider.
    #[arg(long, global = true, env = EMBEDDING_API_KEY_ENV, hide_env_values = true)]
    openai_api_key: Option<String>,

    /// API key of the hosted language model.
    #[arg(long, global = true, env = LLM_API_KEY_ENV, hide_env_values = true)]
    groq_api_key: Option<String>,

    /// OpenAI-compatible embeddings base URL.
    #[arg(long, global = true, env = "DOCUQUERY_EMBEDDING_URL")]
    embedding_url: Option<String>,

    /// Embedding model name.
    #[arg(long, global = true, env = "DOCUQUERY_EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    /// OpenAI-compatible chat completions base URL.
    #[arg(long, global = true, env = "DOCUQUERY_CHAT_URL")]
    chat_url: Option<String>,

    /// Chat model name.
    #[arg(long, global = true, env = "DOCUQUERY_CHAT_MODEL")]
    chat_model: Option<String>,

    /// Per-request timeout for provider calls, in seconds.
    #[arg(long, global = true, default_value = "120")]
    request_timeout_secs: u64,
}

impl ProviderArgs {
    fn endpoints(&self) -> ProviderEndpoints {
        let defaults = ProviderEndpoints::default();
        ProviderEndpoints {
            embedding_base_url: self
                .embedding_url
                .clone()
                .unwrap_or(defaults.embedding_base_url),
            embedding_model: self
                .embedding_model
                .clone()
                .unwrap_or(defaults.embedding_model),
            chat_base_url: self.chat_url.clone().unwrap_or(defaults.chat_base_url),
            chat_model: self.chat_model.clone().unwrap_or(defaults.chat_model),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

#[derive(Subcommand, Clone)]
enum Command {
    /// Interactive session: embed the documents once, then ask questions.
    Shell,
    /// Embed the documents and print indexing statistics.
    Index,
    /// Embed the documents and answer a single question.
    Ask {
        /// Question to answer from the documents.
        #[arg(long)]
        question: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let app_version = env!("CARGO_PKG_VERSION");

    // A missing .env file is fine; the variables may come from the shell.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let command = cli.command.clone().unwrap_or(Command::Shell);
    let options = cli.session.to_options();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        offline = cli.provider.offline,
        "docuquery boot"
    );

    if cli.provider.offline {
        let session = Session::new(CharacterNgramEmbedder::default(), ExtractiveGenerator, options)
            .unwrap_or_else(|error| configuration_failure(error));
        return run(command, session).await;
    }

    let credentials = Credentials::new(
        cli.provider.openai_api_key.clone(),
        cli.provider.groq_api_key.clone(),
    )
    .unwrap_or_else(|error| configuration_failure(error));
    let endpoints = cli.provider.endpoints();

    let embedder = OpenAiEmbedder::new(
        &endpoints.embedding_base_url,
        &endpoints.embedding_model,
        &credentials.embedding_api_key,
        endpoints.request_timeout,
    )
    .unwrap_or_else(|error| configuration_failure(error));
    let generator = ChatCompletionGenerator::new(
        &endpoints.chat_base_url,
        &endpoints.chat_model,
        &credentials.llm_api_key,
        endpoints.request_timeout,
    )
    .unwrap_or_else(|error| configuration_failure(error));

    let session = Session::new(embedder, generator, options)
        .unwrap_or_else(|error| configuration_failure(error));
    run(command, session).await
}

fn configuration_failure(error: impl Display) -> ! {
    eprintln!("configuration error: {error}");
    std::process::exit(2);
}

/// Session failures are reported by `embed_documents` and `answer` and only
/// turn into a failing exit status here.
async fn run<E, G>(command: Command, mut session: Session<E, G>) -> anyhow::Result<ExitCode>
where
    E: Embedder,
    G: AnswerGenerator,
{
    match command {
        Command::Shell => {
            run_shell(session).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Index => match embed_documents(&mut session).await {
            Ok(report) => {
                println!("{}", render_build_report(&report));
                Ok(ExitCode::SUCCESS)
            }
            Err(_) => Ok(ExitCode::FAILURE),
        },
        Command::Ask { question } => {
            if embed_documents(&mut session).await.is_err() {
                return Ok(ExitCode::FAILURE);
            }
            match answer(&session, &question).await {
                Ok(answer) => {
                    println!("{}", render_answer(&answer));
                    Ok(ExitCode::SUCCESS)
                }
                Err(_) => Ok(ExitCode::FAILURE),
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ShellInput<'a> {
    Empty,
    Embed,
    Reset,
    Status,
    Help,
    Quit,
    Question(&'a str),
}

impl<'a> ShellInput<'a> {
    fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        match trimmed {
            "" => Self::Empty,
            ":embed" | ":e" => Self::Embed,
            ":reset" => Self::Reset,
            ":status" => Self::Status,
            ":help" | ":h" | "?" => Self::Help,
            ":quit" | ":q" | ":exit" => Self::Quit,
            question => Self::Question(question),
        }
    }
}

const SHELL_HELP: &str = "\
:embed   embed the documents (run once per session)
:status  show whether the vector store is ready
:reset   discard the vector store
:quit    leave
anything else is asked as a question";

async fn run_shell<E, G>(mut session: Session<E, G>) -> anyhow::Result<()>
where
    E: Embedder,
    G: AnswerGenerator,
{
    println!("{TITLE}");
    println!("{SHELL_HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("Enter Your Question From Documents> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match ShellInput::parse(&line) {
            ShellInput::Empty => continue,
            ShellInput::Quit => break,
            ShellInput::Help => println!("{SHELL_HELP}"),
            ShellInput::Status => println!("{}", render_status(&session)),
            ShellInput::Reset => {
                session.reset();
                println!("Vector store discarded");
            }
            ShellInput::Embed => {
                // errors are already shown to the user
                let _ = embed_documents(&mut session).await;
            }
            ShellInput::Question(question) => {
                if let Ok(answer) = answer(&session, question).await {
                    println!("{}", render_answer(&answer));
                }
            }
        }
    }

    Ok(())
}

fn spinner(message: &'static str) -> ProgressBar {
    let progress = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        progress.set_style(style.tick_chars("-\\|/ "));
    }
    progress.set_message(message);
    progress.enable_steady_tick(Duration::from_millis(80));
    progress
}

async fn embed_documents<E, G>(session: &mut Session<E, G>) -> Result<BuildReport, SessionError>
where
    E: Embedder,
    G: AnswerGenerator,
{
    let progress = spinner("Embedding documents...");
    let result = session.build_index(&LopdfExtractor).await;
    progress.finish_and_clear();

    match &result {
        Ok(report) => {
            for skipped in &report.skipped {
                println!("skipped {}: {}", skipped.path.display(), skipped.reason);
            }
            println!("Vector Store DB Is Ready");
        }
        Err(error) => println!("An error occurred during vector embedding: {error}"),
    }
    result
}

async fn answer<'s, E, G>(
    session: &'s Session<E, G>,
    question: &str,
) -> Result<Answer<'s>, SessionError>
where
    E: Embedder,
    G: AnswerGenerator,
{
    let progress = spinner("Searching documents...");
    let result = session.answer_question(question).await;
    progress.finish_and_clear();

    if let Err(error) = &result {
        println!("An error occurred during document retrieval: {error}");
        if let Some(hint) = retrieval_hint(error) {
            println!("{hint}");
        }
    }
    result
}

fn retrieval_hint(error: &SessionError) -> Option<&'static str> {
    match error {
        SessionError::Retrieval(RetrievalError::NotIndexed) => {
            Some("Run :embed first to build the vector store.")
        }
        SessionError::Retrieval(RetrievalError::QueryEmbedding(_)) => {
            Some("The embedding provider could not be reached.")
        }
        _ => None,
    }
}

fn render_answer(answer: &Answer<'_>) -> String {
    let mut out = format!(
        "Response time: {:.2} seconds\n{}\n\nDocument Similarity Search\n",
        answer.elapsed.as_secs_f64(),
        answer.text.trim()
    );
    for hit in &answer.context {
        out.push_str(&format!(
            "[{} p.{} score={:.4}]\n{}\n{SEPARATOR}\n",
            hit.chunk.source_path, hit.chunk.page, hit.score, hit.chunk.text
        ));
    }
    out
}

fn render_build_report(report: &BuildReport) -> String {
    if report.already_indexed {
        return format!("vector store already built: {} chunks", report.chunks);
    }
    format!(
        "pages_loaded={} pages_indexed={} chunks={} vectors={} skipped_files={} elapsed={:.2}s",
        report.documents_loaded,
        report.documents_indexed,
        report.chunks,
        report.vectors,
        report.skipped.len(),
        report.elapsed.as_secs_f64()
    )
}

fn render_status<E, G>(session: &Session<E, G>) -> String
where
    E: Embedder,
    G: AnswerGenerator,
{
    match (session.phase(), session.index()) {
        (SessionPhase::Indexed, Some(index)) => format!(
            "Vector store ready: {} pages, {} chunks, {} dimensions",
            session.documents().len(),
            index.len(),
            index.dimensions()
        ),
        _ => format!(
            "Vector store not built; :embed reads PDFs from {}",
            session.options().source_dir.display()
        ),
    }
}
