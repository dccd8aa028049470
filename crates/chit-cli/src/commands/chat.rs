//! Chat command implementation

use std::io::{self, Write};

use anyhow::{Context, Result};
use chit_core::{BackendClient, PromptId, PromptLibrary, RecordStore, Session};

/// Send one follow-up turn on a saved analysis, streaming the reply
pub async fn cmd_chat(
    client: &BackendClient,
    store: &RecordStore,
    id: &str,
    message: &str,
) -> Result<()> {
    let mut session = Session::resume(client.clone(), store.clone(), id)
        .with_context(|| format!("No saved analysis with id: {}", id))?;

    let record = session.record();
    println!(
        "💬 {} ({}, {} prior turns)",
        record.merchant,
        record.timestamp,
        record.chat_history.len() / 2
    );
    println!();

    let mut prompts = PromptLibrary::new();
    let prompt = prompts.get(PromptId::ChatAssistant)?;

    let mut stream = session.stream_turn(&prompt.content, message).await?;
    let mut stdout = io::stdout();
    while let Some(delta) = stream.next().await? {
        print!("{}", delta);
        stdout.flush()?;
    }
    println!();

    println!();
    println!(
        "💾 Conversation saved ({} turns)",
        session.record().chat_history.len() / 2
    );

    Ok(())
}
