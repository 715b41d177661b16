//! `clawlink` — interactive REPL client for an OpenClaw-compatible
//! gateway.
//!
//! Connects, performs the hello handshake, then reads lines: plain text
//! is sent as a chat message and the streamed reply is printed; slash
//! commands cover the rest.
//!
//! Usage:
//!   CLAWLINK_TOKEN=secret clawlink --url ws://localhost:18789
//!
//! Env vars:
//!   CLAWLINK_TOKEN — bearer token for the hello handshake (optional)

use std::io::Write;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cl_chat::{ChatEventState, ChatSession, MessageRole};
use cl_client::GatewayClient;
use cl_protocol::methods;

#[derive(Parser, Debug)]
#[command(name = "clawlink", about = "REPL client for an OpenClaw-compatible gateway")]
struct Cli {
    /// Gateway WebSocket URL.
    #[arg(long, default_value = "ws://127.0.0.1:18789")]
    url: String,

    /// Fully-qualified session key for the chat session.
    #[arg(long, default_value = "agent:main:clawlink-repl")]
    session: String,

    /// History entries to load on startup.
    #[arg(long, default_value_t = 50)]
    history_limit: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let token = std::env::var("CLAWLINK_TOKEN").ok();

    let mut builder = GatewayClient::builder()
        .url(&cli.url)
        .on_state_change(|state| tracing::info!(%state, "gateway state"))
        .on_error(|err| tracing::warn!(error = %err, "gateway error"));
    if let Some(token) = token {
        builder = builder.token(token);
    }
    let client = builder.build();

    eprintln!("Connecting to {} ...", cli.url);
    client.connect();
    client.wait_until_connected(Duration::from_secs(10)).await?;

    if let Some(hello) = client.hello() {
        eprintln!(
            "Connected — gateway {} (up {}s)",
            hello.server.version,
            hello.snapshot.uptime_ms / 1000
        );
    }

    let mut session = ChatSession::attach(&client, cli.session.clone());
    session.set_history_limit(cli.history_limit);
    match session.load_history().await {
        Ok(n) if n > 0 => eprintln!("(loaded {n} messages)"),
        Ok(_) => {}
        Err(e) => tracing::debug!(error = %e, "no history available"),
    }

    eprintln!("Session: {}  |  Type /help for commands, Ctrl+D to exit", cli.session);
    eprintln!();

    let mut rl = rustyline::DefaultEditor::new()?;
    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if trimmed.starts_with('/') {
                    if handle_slash_command(trimmed, &client, &session).await {
                        break;
                    }
                    continue;
                }

                let baseline = session.messages().len();
                if let Err(e) = session.send(trimmed).await {
                    eprintln!("\x1B[31merror: {e}\x1B[0m");
                    continue;
                }
                stream_reply(&session, baseline + 1).await;
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    client.disconnect();
    eprintln!("Goodbye!");
    Ok(())
}

/// Process a slash command. Returns `true` if the REPL should exit.
async fn handle_slash_command(
    input: &str,
    client: &GatewayClient,
    session: &ChatSession,
) -> bool {
    match input {
        "/exit" | "/quit" => return true,

        "/abort" => {
            session.abort().await;
            eprintln!("(abort requested)");
        }

        "/state" => {
            eprintln!(
                "state: {}  |  pending rpcs: {}",
                client.state(),
                client.pending_rpcs()
            );
        }

        "/health" => match client.rpc(methods::HEALTH, serde_json::json!({})).await {
            Ok(result) => eprintln!("{result}"),
            Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
        },

        "/history" => {
            for m in session.messages() {
                let who = match m.role {
                    MessageRole::User => "you",
                    MessageRole::Assistant => "agent",
                };
                eprintln!("{who}> {}", m.content);
            }
        }

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /abort     Cancel the in-flight run");
            eprintln!("  /history   Print the local message list");
            eprintln!("  /health    Query gateway health");
            eprintln!("  /state     Show connection state");
            eprintln!("  /exit, /quit");
        }

        other => {
            eprintln!("Unknown command: {other}  (type /help for a list)");
        }
    }

    false
}

/// Print the streamed assistant reply for the turn just sent.
///
/// Deltas carry the full text so far, so normally only the unseen suffix
/// is printed; a rewrite reprints the whole line. `baseline` is the
/// local message count after the optimistic user message — anything at
/// or past it belongs to this turn.
async fn stream_reply(session: &ChatSession, baseline: usize) {
    let mut printed = 0usize;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(300);

    loop {
        let messages = session.messages();
        let latest = messages
            .iter()
            .skip(baseline)
            .rev()
            .find(|m| m.role == MessageRole::Assistant);

        if let Some(m) = latest {
            if m.content.len() >= printed && m.content.is_char_boundary(printed) {
                print!("{}", &m.content[printed..]);
            } else {
                print!("\n{}", m.content);
            }
            std::io::stdout().flush().ok();
            printed = m.content.len();

            match m.state {
                Some(ChatEventState::Final) => {
                    println!();
                    println!();
                    return;
                }
                Some(ChatEventState::Aborted) => {
                    println!();
                    eprintln!("(turn aborted)");
                    return;
                }
                Some(ChatEventState::Error) => {
                    println!();
                    let reason = session
                        .take_error()
                        .unwrap_or_else(|| "unknown error".into());
                    eprintln!("\x1B[31merror: {reason}\x1B[0m");
                    return;
                }
                _ => {}
            }
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            eprintln!("(timed out waiting for a reply)");
            return;
        }
        session.next_change(deadline - now).await;
    }
}
