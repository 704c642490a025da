//! Chatbot management commands.

use std::path::Path;

use anyhow::{Context, Result};
use botly_core::models::{ChatbotUpdate, NewChatbot, TrainingData, UploadFile};
use futures::stream::{self, StreamExt};
use tracing::debug;

use super::{confirm, describe, require_session, Ctx};
use crate::output::{self, print_heading, print_row};

/// Analytics requests in flight at once for `list --stats`.
const MAX_CONCURRENT_STATS: usize = 4;

/// Rows shown by `show` unless `--all` is given.
const RECENT_QUESTIONS: usize = 5;

/// List the user's chatbots.
pub async fn chatbots_list(ctx: &Ctx, stats: bool) -> Result<()> {
    let (session, identity) = require_session(ctx).await?;
    let bots = session
        .call(|api| async move { api.list_chatbots().await })
        .await
        .map_err(describe)?;

    // Question counts per bot, fetched concurrently; a failure leaves a gap
    let counts: Vec<Option<usize>> = if stats {
        stream::iter(bots.iter().map(|bot| {
            let session = session.clone();
            let (user_id, bot_id) = (identity.id, bot.id);
            async move {
                match session
                    .call(|api| async move { api.get_analytics(user_id, bot_id).await })
                    .await
                {
                    Ok(records) => Some(records.len()),
                    Err(e) => {
                        debug!(chatbot_id = bot_id, error = %e, "Analytics unavailable");
                        None
                    }
                }
            }
        }))
        .buffered(MAX_CONCURRENT_STATS)
        .collect()
        .await
    } else {
        vec![None; bots.len()]
    };

    if ctx.format.is_json() {
        let rows: Vec<_> = bots
            .iter()
            .zip(&counts)
            .map(|(bot, count)| serde_json::json!({"chatbot": bot, "questions": count}))
            .collect();
        return output::print_json(&rows);
    }

    if bots.is_empty() {
        println!("No chatbots yet. Create one with 'botly chatbots create <name>'");
        return Ok(());
    }

    println!("{:<6} {:<24} {:<8} {:<10} {}", "ID", "NAME", "PUBLIC", "QUESTIONS", "DATA");
    output::print_divider();
    for (bot, count) in bots.iter().zip(counts) {
        let count = match (stats, count) {
            (false, _) => String::new(),
            (true, Some(n)) => n.to_string(),
            (true, None) => "?".to_string(),
        };
        println!(
            "{:<6} {:<24} {:<8} {:<10} {}",
            bot.id,
            output::truncate(&bot.name, 24),
            if bot.is_public { "yes" } else { "no" },
            count,
            bot.source_display()
        );
    }
    Ok(())
}

/// Show one chatbot with its recent questions.
pub async fn chatbots_show(ctx: &Ctx, chatbot_id: i64, all: bool) -> Result<()> {
    let (session, identity) = require_session(ctx).await?;
    let user_id = identity.id;

    // Detail and analytics resolve independently
    let (detail, analytics) = tokio::join!(
        session.call(|api| async move { api.get_chatbot(chatbot_id).await }),
        session.call(|api| async move { api.get_analytics(user_id, chatbot_id).await }),
    );
    let bot = detail.map_err(describe)?;

    if ctx.format.is_json() {
        let json = match &analytics {
            Ok(records) => serde_json::json!({"chatbot": bot, "analytics": records}),
            Err(e) => serde_json::json!({"chatbot": bot, "analytics_error": e.to_string()}),
        };
        return output::print_json(&json);
    }

    print_heading(&bot.name);
    print_row("ID", &bot.id.to_string());
    print_row("Description", bot.description.as_deref().unwrap_or("-"));
    print_row("Instructions", bot.instructions.as_deref().unwrap_or("-"));
    print_row("Public", if bot.is_public { "yes" } else { "no" });
    print_row("Data", &bot.source_display());
    print_row("Created", &output::format_timestamp(bot.created_at));
    print_row("Last trained", &output::format_timestamp(bot.last_trained));

    match analytics {
        Ok(records) => {
            print_heading(&format!("Questions ({})", records.len()));
            let shown = if all { records.len() } else { RECENT_QUESTIONS };
            for record in records.iter().take(shown) {
                println!(
                    "[{}] Q: {}",
                    output::format_timestamp(record.timestamp),
                    output::truncate(&record.question, 70)
                );
                println!("      A: {}", output::truncate(&record.answer, 70));
            }
            if records.len() > shown {
                println!("... {} more (use --all)", records.len() - shown);
            }
        }
        Err(e) => println!("\nAnalytics unavailable: {}", e),
    }
    Ok(())
}

pub async fn chatbots_create(
    ctx: &Ctx,
    name: String,
    description: Option<String>,
    instructions: Option<String>,
) -> Result<()> {
    let name = name.trim().to_string();
    if name.is_empty() {
        anyhow::bail!("Chatbot name is required");
    }

    let (session, _) = require_session(ctx).await?;
    let new_bot = NewChatbot {
        name,
        description,
        instructions,
    };
    let bot = session
        .call(|api| async move { api.create_chatbot(&new_bot).await })
        .await
        .map_err(describe)?;

    if ctx.format.is_json() {
        return output::print_json(&bot);
    }
    output::print_success(&format!("Created chatbot {} ({})", bot.name, bot.id), ctx.format);
    Ok(())
}

pub async fn chatbots_update(ctx: &Ctx, chatbot_id: i64, update: ChatbotUpdate) -> Result<()> {
    if update.is_empty() {
        anyhow::bail!("Nothing to update; pass at least one of --name, --description, --instructions, --public");
    }

    let (session, _) = require_session(ctx).await?;
    let bot = session
        .call(|api| async move { api.update_chatbot(chatbot_id, &update).await })
        .await
        .map_err(describe)?;

    if ctx.format.is_json() {
        return output::print_json(&bot);
    }
    output::print_success(&format!("Updated chatbot {} ({})", bot.name, bot.id), ctx.format);
    Ok(())
}

pub async fn chatbots_delete(ctx: &Ctx, chatbot_id: i64, yes: bool) -> Result<()> {
    let (session, _) = require_session(ctx).await?;

    if !yes && !confirm(&format!("Delete chatbot {}? This cannot be undone.", chatbot_id)) {
        println!("Cancelled");
        return Ok(());
    }

    let response = session
        .call(|api| async move { api.delete_chatbot(chatbot_id).await })
        .await
        .map_err(describe)?;
    output::print_success(&response.message, ctx.format);
    Ok(())
}

/// Upload a document and/or website for the chatbot to learn from.
pub async fn chatbots_train(
    ctx: &Ctx,
    chatbot_id: i64,
    file: Option<&Path>,
    website: Option<String>,
) -> Result<()> {
    let file = file.map(read_upload).transpose()?;
    let data = TrainingData { file, website };
    if data.is_empty() {
        anyhow::bail!("Provide --file and/or --website");
    }

    let (session, identity) = require_session(ctx).await?;
    let user_id = identity.id;
    if !ctx.format.is_json() {
        println!("Uploading training data...");
    }
    let response = session
        .call(|api| async move { api.upload_training_data(user_id, chatbot_id, data).await })
        .await
        .map_err(describe)?;
    output::print_success(&response.message, ctx.format);
    Ok(())
}

/// Ask a chatbot a question.
pub async fn chatbots_ask(ctx: &Ctx, chatbot_id: i64, question: String) -> Result<()> {
    let question = question.trim().to_string();
    if question.is_empty() {
        anyhow::bail!("Question is required");
    }

    let (session, identity) = require_session(ctx).await?;
    let user_id = identity.id;
    let reply = session
        .call(|api| async move { api.query_chatbot(user_id, chatbot_id, &question).await })
        .await
        .map_err(describe)?;

    if ctx.format.is_json() {
        return output::print_json(&reply);
    }
    println!("{}", reply.answer);
    Ok(())
}

fn read_upload(path: &Path) -> Result<UploadFile> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(UploadFile {
        mime_type: guess_mime_type(&file_name).to_string(),
        file_name,
        bytes,
    })
}

/// Content type for the document formats the backend can ingest.
fn guess_mime_type(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("html") | Some("htm") => "text/html",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type("handbook.PDF"), "application/pdf");
        assert_eq!(guess_mime_type("faq.txt"), "text/plain");
        assert_eq!(guess_mime_type("no_extension"), "application/octet-stream");
    }

    #[test]
    fn test_read_upload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Notes").expect("write");

        let upload = read_upload(&path).expect("read");
        assert_eq!(upload.file_name, "notes.md");
        assert_eq!(upload.mime_type, "text/markdown");
        assert_eq!(upload.bytes, b"# Notes");
    }

    #[test]
    fn test_read_missing_upload() {
        assert!(read_upload(Path::new("/definitely/not/here.pdf")).is_err());
    }
}
