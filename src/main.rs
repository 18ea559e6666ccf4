//! Terminal front end for the agent chat client
//!
//! Reads prompts from stdin, one per line, and prints transcript entries as
//! they are appended. Streamed replies are printed once their exchange ends.

use agent_chat::{ClientConfig, Conversation, TranscriptEntry};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout is reserved for the transcript
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ClientConfig::from_env();
    tracing::info!(url = %config.url, dedup = ?config.dedup, "Starting agent chat");

    let chat = agent_chat::start(&config).await;
    let printer = tokio::spawn(print_transcript(chat.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        chat.send_message(line).await?;
    }

    chat.close();
    printer.await?;
    Ok(())
}

/// Print each entry once it is final
async fn print_transcript(mut updates: watch::Receiver<Conversation>) {
    let mut printed = 0;
    loop {
        {
            let conv = updates.borrow_and_update();
            printed = print_settled(&conv, printed);
        }
        if updates.changed().await.is_err() {
            break;
        }
    }
    // Runtime stopped: flush whatever is left
    let conv = updates.borrow();
    for entry in &conv.transcript()[printed..] {
        print_entry(entry);
    }
}

/// Print entries from `from` up to the placeholder still being streamed
fn print_settled(conv: &Conversation, from: usize) -> usize {
    let active = conv.active_correlation_id();
    let mut printed = from;
    for entry in &conv.transcript()[from..] {
        if active.is_some() && entry.correlation_id.as_deref() == active {
            break;
        }
        print_entry(entry);
        printed += 1;
    }
    printed
}

fn print_entry(entry: &TranscriptEntry) {
    if entry.interrupted {
        println!("[{}] {} [interrupted]", entry.sender, entry.text);
    } else {
        println!("[{}] {}", entry.sender, entry.text);
    }
}
