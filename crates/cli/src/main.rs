mod command;

use std::sync::Arc;
use std::time::Duration;

use command::Command;
use deskloop_core::HelpDesk;
use deskloop_core::config::DeskCfg;
use deskloop_core::escalation::{GlpiClient, Ticketing};
use deskloop_core::feedback::sync;
use deskloop_core::retrieval::web::WebSearchAdapter;
use deskloop_core::store::{MemoryStore, PgStore, SupportStore};
use deskloop_core::types::{Outcome, ResolutionEvent, Ticket};
use deskloop_llm::embedding::{Embedder, HashEmbedder};
use deskloop_llm::provider::LlmProvider;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DB_CONNECT_TIMEOUT_SECS: u64 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let mut startup_notice: Option<String> = None;
    let pool = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let connect_result = tokio::time::timeout(
                Duration::from_secs(DB_CONNECT_TIMEOUT_SECS),
                sqlx::postgres::PgPoolOptions::new().max_connections(8).connect(&url),
            )
            .await;
            match connect_result {
                Ok(Ok(pool)) => match sqlx::migrate!("../../migrations").run(&pool).await {
                    Ok(()) => {
                        tracing::info!("database connected and migrations applied");
                        Some(pool)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "database migration failed, falling back to ephemeral mode");
                        startup_notice = Some("note: database migration failed, running in ephemeral mode".into());
                        None
                    }
                },
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "failed to connect DATABASE_URL, falling back to ephemeral mode");
                    startup_notice = Some("note: could not connect to DATABASE_URL, running in ephemeral mode".into());
                    None
                }
                Err(_) => {
                    tracing::warn!(timeout_secs = DB_CONNECT_TIMEOUT_SECS, "database connect timed out, falling back to ephemeral mode");
                    startup_notice = Some(format!(
                        "note: database connect timed out ({DB_CONNECT_TIMEOUT_SECS}s), running in ephemeral mode"
                    ));
                    None
                }
            }
        }
        Err(_) => None,
    };

    let cfg = match &pool {
        Some(pool) => DeskCfg::load(pool).await?,
        None => DeskCfg::default(),
    }
    .apply_env();
    cfg.validate()?;
    let timeout = cfg.adapter_timeout();

    let store: Arc<dyn SupportStore> = match pool {
        Some(pool) => Arc::new(PgStore::new(pool)),
        None => Arc::new(MemoryStore::new()),
    };
    let embedder: Arc<dyn Embedder> = match deskloop_llm::embedding::from_env(timeout) {
        Some(e) => Arc::new(e),
        None => {
            tracing::info!("no embedding endpoint configured, using hashed bag-of-words vectors");
            Arc::new(HashEmbedder)
        }
    };
    let ticketing: Option<Arc<dyn Ticketing>> = GlpiClient::from_env(timeout).map(|c| Arc::new(c) as _);
    let generation: Option<Arc<dyn LlmProvider>> = deskloop_llm::http::from_env(timeout).map(|p| Arc::new(p) as _);

    let mut builder = HelpDesk::builder(Arc::clone(&store), embedder).config(cfg.clone()).catalog();
    let web = WebSearchAdapter::from_env(timeout);
    if web.is_configured() {
        builder = builder.web(Arc::new(web));
    }
    if let Some(t) = &ticketing {
        builder = builder.ticketing(Arc::clone(t));
    }
    if let Some(g) = generation {
        builder = builder.generation(g);
    }
    let desk = Arc::new(builder.build()?);

    match desk.seed_corpus().await {
        Ok(n) if n > 0 => tracing::info!(seeded = n, "seed corpus loaded"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "corpus seeding failed"),
    }

    let token = CancellationToken::new();
    spawn_sigint_canceler(token.clone());
    if let Some(ticketing) = ticketing {
        sync::spawn(
            Arc::clone(&store),
            ticketing,
            desk.resolution_loop(),
            cfg.remote_sync_interval_secs,
            token.clone(),
        );
    }

    let asker = std::env::var("DESKLOOP_ASKER")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "anonymous".into());
    let result = run_repl(&desk, &asker, token.clone(), startup_notice).await;
    token.cancel();
    result
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    match std::env::var("DESKLOOP_LOG_FILE") {
        Ok(path) => {
            let file = std::fs::File::create(path)?;
            registry.with(fmt::layer().json().with_target(true).with_writer(file)).init();
        }
        Err(_) => {
            registry.with(fmt::layer().json().with_target(true).with_writer(std::io::stderr)).init();
        }
    }
    Ok(())
}

async fn run_repl(
    desk: &HelpDesk,
    asker: &str,
    token: CancellationToken,
    startup_notice: Option<String>,
) -> anyhow::Result<()> {
    if let Some(notice) = startup_notice {
        println!("{notice}");
    }
    println!("deskloop, asking as {asker}. /help for commands.");

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<InputEvent>();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
    spawn_input_thread(line_tx, ready_rx);
    request_next_prompt(&ready_tx);

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = line_rx.recv() => line,
        };
        let text = match line {
            Some(InputEvent::Line(text)) => text,
            Some(InputEvent::Interrupted) | Some(InputEvent::Eof) | None => break,
            Some(InputEvent::Error(err)) => {
                eprintln!("input error: {err}");
                break;
            }
        };

        match command::parse(&text) {
            None => {}
            Some(Err(e)) => println!("error: {e}"),
            Some(Ok(Command::Quit)) => break,
            Some(Ok(cmd)) => {
                // Ctrl-C abandons the request in flight, then the session.
                execute(desk, asker, cmd, &token.child_token()).await;
            }
        }
        request_next_prompt(&ready_tx);
    }
    drop(ready_tx);
    println!();
    Ok(())
}

async fn execute(desk: &HelpDesk, asker: &str, cmd: Command, cancel: &CancellationToken) {
    let result = match cmd {
        Command::Ask(text) => desk.ask_with_cancel(asker, &text, cancel).await.map(|reply| {
            match (reply.decision.outcome, reply.answer, reply.escalation) {
                (Outcome::Answered, Some(answer), _) => {
                    let tier = reply.decision.winning_tier.map(|t| t.as_str()).unwrap_or("?");
                    println!("{}\n", answer.text);
                    if let Some(id) = reply.answer_id {
                        println!("[{tier}] answer {id}  (/feedback {id} ok|ko)");
                    }
                }
                (_, _, Some(receipt)) => {
                    let t = &receipt.ticket;
                    let verb = if receipt.reused { "already escalated as" } else { "escalated as" };
                    println!("No confident answer; {verb} ticket {}", t.id);
                    println!("  category: {}  priority: {}  assigned to: {}", t.category, t.priority, t.assignee);
                    if !receipt.mirrored {
                        println!("  (not mirrored to the ticketing system)");
                    }
                }
                _ => println!("No answer."),
            }
        }),
        Command::Resolve { ticket, technician, solution } => desk
            .record_resolution(ResolutionEvent::resolved(ticket, technician, solution))
            .await
            .map(|t| println!("ticket {} {}; the answer is now part of the corpus", t.id, t.status.as_db_str())),
        Command::Progress(id) => desk.start_progress(id).await.map(|t| print_ticket(&t)),
        Command::Close(id) => desk.close(id).await.map(|t| print_ticket(&t)),
        Command::Feedback { answer, is_valid } => desk
            .submit_feedback(answer, is_valid)
            .await
            .map(|a| println!("thanks, answer {} validity {}", a.id, a.validity)),
        Command::Tickets => desk.tickets().await.map(|tickets| {
            if tickets.is_empty() {
                println!("no tickets");
            }
            tickets.iter().for_each(print_ticket);
        }),
        Command::Help => {
            println!("{}", command::HELP);
            Ok(())
        }
        Command::Quit => Ok(()),
    };
    if let Err(e) = result {
        println!("error: {e}");
    }
}

fn print_ticket(t: &Ticket) {
    println!(
        "{}  {:<11}  {:<15}  {:<8}  {}",
        t.id,
        t.status.as_db_str(),
        t.category.label(),
        t.priority.label(),
        t.title
    );
}

fn request_next_prompt(ready_tx: &std::sync::mpsc::Sender<()>) {
    let _ = ready_tx.send(());
}

fn spawn_input_thread(line_tx: mpsc::UnboundedSender<InputEvent>, ready_rx: std::sync::mpsc::Receiver<()>) {
    std::thread::spawn(move || {
        let mut editor = match rustyline::DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                let _ = line_tx.send(InputEvent::Error(e.to_string()));
                return;
            }
        };

        while ready_rx.recv().is_ok() {
            match editor.readline("? ") {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    if line_tx.send(InputEvent::Line(line)).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    let _ = line_tx.send(InputEvent::Interrupted);
                    break;
                }
                Err(ReadlineError::Eof) => {
                    let _ = line_tx.send(InputEvent::Eof);
                    break;
                }
                Err(e) => {
                    let _ = line_tx.send(InputEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    });
}

enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
    Error(String),
}

fn spawn_sigint_canceler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}
