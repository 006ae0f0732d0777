//! `chatloom chat` — interactive or single-message chat.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chatloom::ChatSession;
use chatloom_agent::{ExchangeEvent, ExchangeRunner};
use chatloom_config::AppConfig;
use chatloom_render::DocumentTree;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

pub async fn run(message: Option<String>, html: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if config.api_key.is_none() {
        eprintln!("  note: no API key configured; requests are sent unauthenticated");
    }

    let provider = Arc::new(chatloom_providers::from_config(&config)?);
    let model = chatloom_providers::resolve_model(&config, provider.as_ref()).await;
    let tools = Arc::new(chatloom_tools::default_registry());
    let tool_names = tools.names().join(", ");

    let runner = ExchangeRunner::new(provider, model, tools).with_chat_config(&config.chat);
    let mut session = ChatSession::from_config(runner, &config.render);

    if let Some(msg) = message {
        let result = turn(&mut session, &msg).await;
        if let Some(path) = &html {
            write_html(session.tree(), path).await?;
        }
        result?;
        return Ok(());
    }

    println!();
    println!("  chatloom — interactive mode");
    println!();
    println!("  Endpoint:  {}", config.endpoint);
    println!("  Model:     {}", session.runner().model());
    println!("  Tools:     {tool_names}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        if let Err(e) = turn(&mut session, line).await {
            eprintln!("  [Error] {e}");
        }
        println!();

        if let Some(path) = &html {
            write_html(session.tree(), path).await?;
        }
    }

    println!();
    Ok(())
}

/// Run one exchange, echoing the answer to stdout as it streams.
async fn turn(session: &mut ChatSession, text: &str) -> Result<(), chatloom_core::Error> {
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(echo(rx));

    let result = session.send(text, Some(tx)).await;
    let _ = printer.await;

    let finished = result?;
    if finished.outcome.answer.is_empty() {
        println!("  (no answer)");
    }
    Ok(())
}

async fn echo(mut rx: mpsc::UnboundedReceiver<ExchangeEvent>) {
    let mut round = 0;
    let mut printed = String::new();
    let mut out = std::io::stdout();

    while let Some(event) = rx.recv().await {
        match event {
            ExchangeEvent::TextChanged { round: r, answer, .. } => {
                if r != round {
                    if !printed.is_empty() {
                        let _ = writeln!(out);
                    }
                    round = r;
                    printed.clear();
                }
                // Answers only grow within a round.
                if let Some(delta) = answer.strip_prefix(printed.as_str()) {
                    let _ = write!(out, "{delta}");
                    let _ = out.flush();
                    printed = answer;
                }
            }
            ExchangeEvent::ToolCall { name, input, .. } => {
                eprintln!("  [tool] {name} {input}");
            }
            ExchangeEvent::ToolResult { name, output, success, .. } => {
                let status = if success { "ok" } else { "failed" };
                eprintln!("  [tool] {name} {status}: {output}");
            }
            ExchangeEvent::RoundLimitReached { rounds } => {
                eprintln!("  [limit] stopped after {rounds} rounds");
            }
            ExchangeEvent::Done { .. } => {
                if !printed.is_empty() {
                    let _ = writeln!(out);
                }
            }
            ExchangeEvent::RoundCompleted { .. } | ExchangeEvent::Error { .. } => {}
        }
    }
}

async fn write_html(tree: &DocumentTree, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let page = format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>chatloom</title>\n\
         <script async src=\"https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-chtml.js\"></script>\n\
         </head>\n<body>\n{}</body>\n</html>\n",
        tree.to_html().await
    );
    tokio::fs::write(path, page).await?;
    tracing::debug!(path = %path.display(), "Wrote conversation HTML");
    Ok(())
}
