//! `hba ask` and `hba chat`.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::bootstrap;
use crate::chat::{Assistant, ChatResponse, Session};
use crate::config::Config;

/// Answer one query and exit. With `session`, the conversation is resumed
/// from and saved back to the store.
pub async fn run_ask(config: &Config, query: &str, session: Option<String>) -> Result<()> {
    let runtime = bootstrap::build(config).await?;
    let assistant = &runtime.assistant;

    let mut current = match &session {
        Some(id) => assistant.resume_session(id).await,
        None => assistant.new_session(),
    };

    let response = assistant.handle(&mut current, query).await;
    print_response(&response);

    if session.is_some() {
        assistant.save_session(&current).await;
    }
    Ok(())
}

/// Interactive session over stdin.
///
/// `/reset` clears the conversation, `/summary` prints the conversation and
/// domain summaries, `/quit` (or end of input) exits.
pub async fn run_chat(config: &Config, session: Option<String>) -> Result<()> {
    let runtime = bootstrap::build(config).await?;
    let assistant = &runtime.assistant;

    let mut current = match &session {
        Some(id) => assistant.resume_session(id).await,
        None => assistant.new_session(),
    };

    println!(
        "Ask me about {}. Commands: /reset, /summary, /quit",
        config.domain.name
    );
    println!("Session: {}", current.id());
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                current.reset();
                println!("Conversation cleared.");
            }
            "/summary" => print_summary(assistant, &current),
            query => {
                let response = assistant.handle(&mut current, query).await;
                print_response(&response);
                print_suggestions(&assistant.suggestions(query));
            }
        }
        println!();
    }

    assistant.save_session(&current).await;
    Ok(())
}

fn print_response(response: &ChatResponse) {
    println!("{}", response.response);

    if !response.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, source) in response.sources.iter().enumerate() {
            println!("  {}. {} ({})", i + 1, source.title, source.url);
        }
    }

    let tokens = &response.token_info;
    if !tokens.is_zero() {
        println!();
        println!(
            "Tokens: {} in, {} out, {} total (${:.6})",
            tokens.input_tokens, tokens.output_tokens, tokens.total_tokens, tokens.cost_usd
        );
    }
}

fn print_suggestions(suggestions: &[String]) {
    if suggestions.is_empty() {
        return;
    }
    println!();
    println!("You might also ask:");
    for s in suggestions {
        println!("  - {}", s);
    }
}

fn print_summary(assistant: &Assistant, session: &Session) {
    let conversation = assistant.conversation_summary(session);
    let domain = assistant.domain_summary(session);

    println!("Session:     {}", conversation.session_id);
    println!("Messages:    {}", conversation.message_count);
    println!(
        "Last update: {}",
        conversation
            .last_update
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string())
    );
    println!("Model:       {}", conversation.model);
    println!(
        "Domain:      {} (confidence {:.2})",
        if domain.is_domain_focused { "focused" } else { "unfocused" },
        domain.confidence
    );
    if let Some(topic) = &domain.last_topic {
        println!("Last topic:  {}", topic);
    }
    if !domain.recent_topics.is_empty() {
        println!("Recent:      {}", domain.recent_topics.join(" | "));
    }
}
