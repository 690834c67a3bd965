mod app;

use anyhow::{bail, Result};
use app::App;
use clap::{Parser, Subcommand, ValueEnum};
use memory_core::budget::context::DEFAULT_VALIDATION_BUFFER;
use memory_core::budget::TokenEstimator;
use memory_core::orchestrator::prompt::transcript_line;
use memory_core::summary::{select_class_for_model, stats};
use memory_core::{ContextBudget, Message, ThreadStore};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "threadmem")]
#[command(about = "Token budgeting and structured memory for conversation threads")]
#[command(version)]
struct Cli {
    /// Config file (JSON or TOML); defaults to ~/.threadmem/config.json or ./threadmem.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Thread store directory
    #[arg(long, global = true, env = "THREADMEM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    User,
    Assistant,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate tokens for a piece of text
    Count {
        text: String,
        #[arg(long)]
        model: Option<String>,
    },
    /// Estimate tokens for a stored thread
    CountMessages {
        thread: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        system: Option<String>,
    },
    /// Check a token count against a model's window
    Validate {
        used: u32,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value_t = DEFAULT_VALIDATION_BUFFER)]
        buffer: u32,
    },
    /// Check whether text fits next to tokens already in use
    CheckFit {
        text: String,
        #[arg(long)]
        model: Option<String>,
        /// Tokens already committed to the context
        #[arg(long, default_value_t = 0)]
        used: u32,
        #[arg(long, default_value_t = DEFAULT_VALIDATION_BUFFER)]
        buffer: u32,
    },
    /// Tokens still free in a model's window
    Available {
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value_t = 0)]
        used: u32,
        #[arg(long, default_value_t = DEFAULT_VALIDATION_BUFFER)]
        buffer: u32,
    },
    /// Budget and summary state of a thread
    Status {
        thread: String,
        #[arg(long)]
        model: Option<String>,
    },
    /// List known model profiles
    Models,
    /// List stored threads
    Threads,
    /// Append a message to a thread and summarize if due
    Append {
        thread: String,
        content: String,
        #[arg(long, value_enum, default_value = "user")]
        role: RoleArg,
        #[arg(long, default_value = "user")]
        sender: String,
        /// Skip the summarization check
        #[arg(long)]
        no_summarize: bool,
    },
    /// Summarize a thread now
    Summarize {
        thread: String,
        /// Ignore the trigger policy
        #[arg(long)]
        force: bool,
    },
    /// Show the prompt that would be sent for a new message
    Context {
        thread: String,
        message: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        system: Option<String>,
    },
    /// Send a message, store the reply and summarize if due
    Chat {
        thread: String,
        message: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        system: Option<String>,
        #[arg(long, default_value = "user")]
        sender: String,
    },
    /// Latest summary of a thread, rendered for a model
    Summary {
        thread: String,
        #[arg(long)]
        model: Option<String>,
        /// Print the full stored record as JSON
        #[arg(long)]
        raw: bool,
    },
    /// Per-field item counts of the latest summary
    Stats { thread: String },
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
                .with_file(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Budget for `model` with `used` tokens already committed.
fn committed_budget(estimator: TokenEstimator, model: &str, used: u32, buffer: u32) -> ContextBudget {
    let mut budget = ContextBudget::with_buffer(estimator, model, buffer);
    if used > 0 {
        budget.add_tokens(used, "committed");
    }
    budget
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let app = App::init(cli.config.as_deref(), cli.data_dir.as_deref()).await?;
    let orch = &app.orchestrator;

    match cli.command {
        Commands::Count { text, model } => {
            let model = app.model(model.as_deref());
            let estimate = orch.estimator().estimate_detailed(&text, model);
            print_json(&json!({
                "model": model,
                "tokens": estimate.tokens,
                "verified": estimate.verified,
            }))?;
        }
        Commands::CountMessages { thread, model, system } => {
            let model = app.model(model.as_deref());
            let messages = app.store.get_messages(&thread).await?;
            let tokens = orch.estimate_messages(&messages, model, system.as_deref());
            print_json(&json!({
                "thread": thread,
                "model": model,
                "messages": messages.len(),
                "tokens": tokens,
            }))?;
        }
        Commands::Validate { used, model, buffer } => {
            let model = app.model(model.as_deref());
            let status = orch.budget_status(model, used, buffer);
            print_json(&serde_json::to_value(&status)?)?;
        }
        Commands::CheckFit {
            text,
            model,
            used,
            buffer,
        } => {
            let model = app.model(model.as_deref());
            let budget = committed_budget(orch.estimator().clone(), model, used, buffer);
            print_json(&json!({
                "model": model,
                "tokens": orch.estimator().estimate(&text, model),
                "fits": budget.can_fit(&text),
                "available": budget.available(),
            }))?;
        }
        Commands::Available { model, used, buffer } => {
            let model = app.model(model.as_deref());
            let budget = committed_budget(orch.estimator().clone(), model, used, buffer);
            print_json(&json!({
                "model": model,
                "available": budget.available(),
                "budget": budget.status(),
            }))?;
        }
        Commands::Status { thread, model } => {
            let model = app.model(model.as_deref());
            let messages = app.store.get_messages(&thread).await?;
            let latest = orch.latest_summary(&thread).await?;
            let mut budget = ContextBudget::new(orch.estimator().clone(), model);
            for message in &messages {
                budget.add_from(&message.content, message.role.as_str());
            }
            print_json(&json!({
                "thread": thread,
                "messages": messages.len(),
                "covered": latest.as_ref().map(|s| s.message_count_covered).unwrap_or(0),
                "summaries": app.store.list_summaries(&thread).await?.len(),
                "should_summarize": orch.should_summarize(&thread).await?,
                "size_class": select_class_for_model(orch.profiles(), model).as_str(),
                "budget": budget.status(),
                "advisory": budget.advisory(),
            }))?;
        }
        Commands::Models => {
            for profile in orch.profiles().list() {
                println!(
                    "{:<32} window={:<7} max_out={:<6} class={:<6} {}",
                    profile.name,
                    profile.context_window,
                    profile.max_output_tokens,
                    profile.summary_size_class.as_str(),
                    profile.description
                );
            }
        }
        Commands::Threads => {
            for thread in app.store.list_threads().await? {
                println!("{}", thread);
            }
        }
        Commands::Append {
            thread,
            content,
            role,
            sender,
            no_summarize,
        } => {
            let message = match role {
                RoleArg::User => Message::user(sender, content),
                RoleArg::Assistant => Message::assistant(content, None),
            };
            println!("{}", transcript_line(&message));
            app.store.append_message(&thread, &message).await?;
            if !no_summarize {
                let outcome = orch.maybe_summarize(&thread).await;
                print_json(&serde_json::to_value(&outcome)?)?;
            }
        }
        Commands::Summarize { thread, force } => {
            let outcome = if force {
                orch.summarize_now(&thread).await
            } else {
                orch.maybe_summarize(&thread).await
            };
            print_json(&serde_json::to_value(&outcome)?)?;
        }
        Commands::Context {
            thread,
            message,
            model,
            system,
        } => {
            let model = app.model(model.as_deref());
            let prepared = orch
                .prepare_chat_context(&thread, model, system.as_deref(), &message)
                .await?;
            print_json(&json!({
                "system_prompt": prepared.system_prompt,
                "messages": prepared.messages,
                "token_usage": prepared.token_usage,
                "truncation_occurred": prepared.truncation_occurred,
                "advisory": prepared.advisory,
            }))?;
        }
        Commands::Chat {
            thread,
            message,
            model,
            system,
            sender,
        } => {
            if app.config.api_key.is_none() {
                bail!("OPENROUTER_API_KEY is not set");
            }
            let model = app.model(model.as_deref());
            let prepared = orch
                .prepare_chat_context(&thread, model, system.as_deref(), &message)
                .await?;
            if let Some(advisory) = &prepared.advisory {
                eprintln!("{}", advisory.message);
            }

            let request = orch.build_chat_request(model, prepared)?;
            let reply = app.invoker.invoke(request).await?;

            app.store
                .append_message(&thread, &Message::user(sender, message))
                .await?;
            app.store
                .append_message(&thread, &Message::assistant(reply.clone(), Some(model.to_string())))
                .await?;
            println!("{}", reply);

            let outcome = orch.spawn_maybe_summarize(thread).await?;
            tracing::debug!(?outcome, "Post-turn summarization");
        }
        Commands::Summary { thread, model, raw } => {
            let Some(stored) = orch.latest_summary(&thread).await? else {
                eprintln!("No summary for thread '{}'", thread);
                return Ok(());
            };
            if raw {
                print_json(&serde_json::to_value(&stored)?)?;
            } else {
                let model = app.model(model.as_deref());
                println!("{}", orch.get_rendered_context(&thread, model).await);
            }
        }
        Commands::Stats { thread } => {
            let Some(stored) = orch.latest_summary(&thread).await? else {
                eprintln!("No summary for thread '{}'", thread);
                return Ok(());
            };
            print_json(&serde_json::to_value(stats(&stored.record))?)?;
        }
    }

    Ok(())
}
