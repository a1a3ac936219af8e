//! # IntelliDoc CLI Application
//!
//! Command-line front end for asking questions about a PDF document.
//!
//! ## Key Components
//!
//! - CLI argument parsing with clap
//! - Subcommands:
//!   - `process`: extract, chunk, embed and index a PDF
//!   - `ask`: answer one question against an existing index
//!   - `chat`: interactive conversation with mode switching and history
//!   - `indexes`: list knowledge bases
//!   - `clear`: delete every vector of a knowledge base
//!
//! Credentials and defaults come from the environment (see `Settings`);
//! chunking flags override the environment for a single run.

mod logging;
mod telemetry;

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use intellidoc::config::Settings;
use intellidoc::format_markdown;
use intellidoc::index::{IndexReport, PineconeClient, SourceChunk};
use intellidoc::model::{AzureChat, AzureEmbedder};
use intellidoc::processor::ChunkOptions;
use intellidoc::search::{Answer, AnswerMode};
use intellidoc::session::{Assistant, ProcessingStage, Role};
use telemetry::OtelGuard;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::instrument;

type DocumentAssistant = Assistant<AzureChat, AzureEmbedder, PineconeClient>;

/// Characters of a source chunk shown under an answer
const SOURCE_PREVIEW_CHARS: usize = 160;

#[derive(Parser)]
#[command(author, version, about = "Ask questions about PDF documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract, chunk and index a PDF into a knowledge base
    Process(ProcessArgs),

    /// Answer a single question from an indexed document
    Ask(AskArgs),

    /// Start an interactive question-answering session
    Chat(ChatArgs),

    /// List knowledge bases
    Indexes,

    /// Delete every vector of a knowledge base
    Clear(ClearArgs),
}

#[derive(Args, Debug)]
struct ChunkArgs {
    /// Chunk size in characters (default: CHUNK_SIZE or 1000)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Characters shared by consecutive chunks (default: CHUNK_OVERLAP or 20)
    #[arg(long)]
    chunk_overlap: Option<usize>,
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// PDF file to process
    #[arg(required = true)]
    file: PathBuf,

    /// Knowledge base to write to (default: INTELLIDOC_INDEX or intellidoc-index)
    #[arg(short, long)]
    index: Option<String>,

    #[command(flatten)]
    chunking: ChunkArgs,
}

#[derive(Args, Debug)]
struct AskArgs {
    /// Question to answer
    #[arg(required = true)]
    question: String,

    /// Knowledge base to answer from
    #[arg(short, long)]
    index: Option<String>,

    /// Answer from the document or from general knowledge
    #[arg(short, long, value_enum, default_value_t = ModeArg::Grounded)]
    mode: ModeArg,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Chunks retrieved per question
    #[arg(short = 'k', long)]
    top_k: Option<usize>,
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// PDF to process before the first question
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Knowledge base to use; an existing one is resumed when no file is given
    #[arg(short, long)]
    index: Option<String>,

    #[command(flatten)]
    chunking: ChunkArgs,
}

#[derive(Args, Debug)]
struct ClearArgs {
    /// Knowledge base to clear
    #[arg(short, long)]
    index: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    /// Answer only from retrieved document chunks
    Grounded,
    /// Ask the language model directly
    Open,
}

impl From<ModeArg> for AnswerMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Grounded => AnswerMode::ContextGrounded,
            ModeArg::Open => AnswerMode::OpenKnowledge,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The chat loop owns the terminal, so its logs go to a file
    let mut _otel: Option<OtelGuard> = None;
    if !matches!(cli.command, Some(Commands::Chat(_))) {
        _otel = Some(telemetry::init_tracing_subscriber()?);
    }

    match cli.command {
        Some(Commands::Process(args)) => {
            process_command(args).await?;
        }
        Some(Commands::Ask(args)) => {
            ask_command(args).await?;
        }
        Some(Commands::Chat(args)) => {
            let log_file = logging::setup_logging()?;
            chat_command(args, &log_file).await?;
        }
        Some(Commands::Indexes) => {
            indexes_command().await?;
        }
        Some(Commands::Clear(args)) => {
            clear_command(args).await?;
        }
        None => {
            let _ = Cli::parse_from(["intellidoc", "--help"]);
        }
    }

    Ok(())
}

fn load_settings(chunking: Option<&ChunkArgs>) -> anyhow::Result<Settings> {
    let mut settings = Settings::from_env()?;
    if let Some(chunking) = chunking {
        let options = ChunkOptions {
            max_chars: chunking
                .chunk_size
                .unwrap_or(settings.chunk_options.max_chars),
            overlap: chunking
                .chunk_overlap
                .unwrap_or(settings.chunk_options.overlap),
        };
        options.validate()?;
        settings.chunk_options = options;
    }
    Ok(settings)
}

async fn connect(settings: &Settings) -> anyhow::Result<DocumentAssistant> {
    let spinner = spinner("Connecting to services...")?;
    let assistant = Assistant::connect(settings).await;
    spinner.finish_and_clear();
    Ok(assistant?)
}

fn spinner(message: &str) -> anyhow::Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

fn stage_message(stage: &ProcessingStage) -> String {
    match stage {
        ProcessingStage::Reading { source } => format!("Reading {}...", source),
        ProcessingStage::Chunked { pages, chunks } => {
            format!("Split {} pages into {} chunks", pages, chunks)
        }
        ProcessingStage::CheckingEmbeddings => "Checking the embedding deployment...".to_string(),
        ProcessingStage::PreparingIndex { index } => format!("Preparing index {}...", index),
        ProcessingStage::Uploading { chunks } => format!("Embedding and uploading {} chunks...", chunks),
        ProcessingStage::Indexed(report) => format!("Indexed {} chunks", report.upserted),
    }
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Process a PDF with a spinner that follows the processing stages
async fn process_file(
    assistant: &mut DocumentAssistant,
    path: &Path,
    index_name: &str,
) -> anyhow::Result<IndexReport> {
    let bytes = tokio::fs::read(path).await?;
    let source = source_name(path);

    let progress = spinner(&format!("Processing {}...", source))?;
    let result = assistant
        .process_document(&bytes, &source, index_name, {
            let progress = progress.clone();
            move |stage| progress.set_message(stage_message(&stage))
        })
        .await;

    match result {
        Ok(report) => {
            progress.finish_with_message(format!(
                "Indexed {} chunks from {} into {}",
                report.upserted, source, report.index
            ));
            Ok(report)
        }
        Err(err) => {
            progress.abandon_with_message("Processing failed");
            Err(err.into())
        }
    }
}

/// User-facing text for a failure, preferring the library's own wording
fn describe(err: &anyhow::Error) -> String {
    match err.downcast_ref::<intellidoc::Error>() {
        Some(err) => err.user_message(),
        None => err.to_string(),
    }
}

fn print_answer(answer: &Answer) -> anyhow::Result<()> {
    println!();
    format_markdown(&answer.text)?;
    println!("[{}] {}", answer.mode.tag(), answer.mode.footer());
    print_sources(&answer.sources);
    Ok(())
}

fn print_sources(sources: &[SourceChunk]) {
    if sources.is_empty() {
        return;
    }
    println!("\nSources:");
    for (i, source) in sources.iter().enumerate() {
        let preview: String = source.text.chars().take(SOURCE_PREVIEW_CHARS).collect();
        let ellipsis = if source.text.chars().count() > SOURCE_PREVIEW_CHARS {
            "..."
        } else {
            ""
        };
        println!(
            "{}. {} chunk {} (score {:.3})",
            i + 1,
            source.source,
            source.position,
            source.score
        );
        println!("   {}{}", preview.replace('\n', " "), ellipsis);
    }
}

#[instrument]
async fn process_command(args: ProcessArgs) -> anyhow::Result<()> {
    let settings = load_settings(Some(&args.chunking))?;
    let index_name = args.index.unwrap_or_else(|| settings.index_name.clone());

    let mut assistant = connect(&settings).await?;
    let report = process_file(&mut assistant, &args.file, &index_name).await?;

    println!(
        "Document processed: {} chunks written to index {}",
        report.upserted, report.index
    );
    Ok(())
}

#[instrument]
async fn ask_command(args: AskArgs) -> anyhow::Result<()> {
    let settings = load_settings(None)?;
    let index_name = args.index.unwrap_or_else(|| settings.index_name.clone());

    let mut assistant = connect(&settings).await?;
    if let Some(top_k) = args.top_k {
        anyhow::ensure!(top_k > 0, "--top-k must be greater than zero");
        assistant.search_mut().set_top_k(top_k);
    }
    assistant.resume(&index_name).await?;
    assistant.session_mut().set_mode(args.mode.into());

    let answer = assistant.ask(&args.question).await?;

    match args.format.as_str() {
        "json" => {
            let json_response = serde_json::json!({
                "question": args.question,
                "index": index_name,
                "answer": answer,
            });
            println!("{}", serde_json::to_string_pretty(&json_response)?);
        }
        _ => print_answer(&answer)?,
    }
    Ok(())
}

const CHAT_HELP: &str = "Commands:
  /load <pdf>   process a PDF into the current index
  /mode         switch between document and general knowledge answers
  /new-chat     clear the conversation, keep the document
  /new-doc      forget the document and the conversation
  /history      show the conversation
  /status       show the document, index and mode
  /help         show this help
  /quit         leave";

#[instrument(skip(log_file))]
async fn chat_command(args: ChatArgs, log_file: &Path) -> anyhow::Result<()> {
    let settings = load_settings(Some(&args.chunking))?;
    let index_name = args.index.unwrap_or_else(|| settings.index_name.clone());

    let mut assistant = connect(&settings).await?;
    println!("IntelliDoc - logs are written to {}", log_file.display());

    if let Some(file) = &args.file {
        process_file(&mut assistant, file, &index_name).await?;
    } else if let Err(err) = assistant.resume(&index_name).await {
        println!("{}", err.user_message());
        println!("Load a document with /load <pdf>.");
    }
    println!("{}\n", CHAT_HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("[{}] > ", assistant.session().mode().tag());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" | "/exit" => break,
            "/help" => println!("{}", CHAT_HELP),
            "/load" => {
                if argument.is_empty() {
                    println!("Usage: /load <pdf>");
                    continue;
                }
                if let Err(err) = process_file(&mut assistant, Path::new(argument), &index_name).await {
                    println!("{}", describe(&err));
                }
            }
            "/mode" => {
                let mode = assistant.session_mut().toggle_mode();
                println!("Answering in {} mode", mode);
            }
            "/new-chat" => {
                assistant.session_mut().new_chat();
                println!("Conversation cleared");
            }
            "/new-doc" => {
                assistant.session_mut().new_document();
                println!("Document unloaded; use /load <pdf> to start again");
            }
            "/history" => print_history(&assistant),
            "/status" => print_status(&assistant, &index_name),
            _ if command.starts_with('/') => {
                println!("Unknown command {}; type /help", command);
            }
            _ => match assistant.ask(line).await {
                Ok(answer) => print_answer(&answer)?,
                Err(err) => println!("{}", err.user_message()),
            },
        }
        println!();
    }

    Ok(())
}

fn print_history(assistant: &DocumentAssistant) {
    let turns = assistant.session().turns();
    if turns.is_empty() {
        println!("No messages yet");
        return;
    }
    for turn in turns {
        let label = match (turn.role, turn.mode) {
            (Role::User, _) => "you".to_string(),
            (Role::Assistant, Some(mode)) => format!("assistant [{}]", mode.tag()),
            (Role::Assistant, None) => "assistant [error]".to_string(),
        };
        println!(
            "{} {}: {}",
            turn.timestamp.format("%H:%M:%S"),
            label,
            turn.content
        );
    }
}

fn print_status(assistant: &DocumentAssistant, index_name: &str) {
    let session = assistant.session();
    match session.index() {
        Some(index) => {
            println!(
                "Document: {}",
                session.document().unwrap_or("(resumed from existing index)")
            );
            println!("Index: {} ({} dimensions)", index.name, index.dimension);
        }
        None => println!("Document: none loaded (next /load writes to {})", index_name),
    }
    println!("Mode: {}", session.mode());
    println!("Messages: {}", session.turns().len());
}

#[instrument]
async fn indexes_command() -> anyhow::Result<()> {
    let settings = load_settings(None)?;
    let assistant = connect(&settings).await?;

    let indexes = assistant.list_indexes().await?;
    println!("Knowledge bases: {}", indexes.len());
    for index in indexes {
        println!(
            "{} - {} dimensions, {} ({})",
            index.name,
            index.dimension,
            index.metric,
            if index.ready { "ready" } else { "initializing" }
        );
    }
    Ok(())
}

#[instrument]
async fn clear_command(args: ClearArgs) -> anyhow::Result<()> {
    let settings = load_settings(None)?;
    let index_name = args.index.unwrap_or_else(|| settings.index_name.clone());

    let assistant = connect(&settings).await?;
    assistant.clear_index(&index_name).await?;
    println!("Cleared every vector from {}", index_name);
    Ok(())
}
