//! One function per subcommand.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::try_join_all;
use lexdoc_core::backend::ChatMessage;
use lexdoc_core::gate;
use lexdoc_core::status::{StatusKind, StatusPoller};
use lexdoc_core::{
    ChannelEmitter, Document, HttpBackend, LocalFile, Readiness, StatusEvent, UploadMode,
    Workspace,
};

use crate::Context;

/// Upload, open the session, then follow readiness until every document is
/// terminal or Ctrl+C is pressed.
pub async fn upload(ctx: Context, paths: Vec<PathBuf>, compare: bool) -> anyhow::Result<()> {
    let files = try_join_all(paths.iter().map(|p| LocalFile::from_path(p))).await?;

    let (emitter, mut events) = ChannelEmitter::new();
    let workspace = Workspace::connect(&ctx.settings, ctx.auth.clone(), Arc::new(emitter))?;

    let mode = if compare {
        UploadMode::Compare
    } else {
        UploadMode::Single
    };
    let selection = workspace.select_files(files, mode).await;
    for name in &selection.rejected {
        println!("Skipped {}: unsupported file type", name);
    }
    for name in &selection.dropped {
        println!("Skipped {}: selection is full", name);
    }

    let submission = match workspace.submit().await {
        Ok(submission) => submission,
        Err(e) => {
            workspace.unmount().await;
            return Err(e.into());
        }
    };
    for failure in &submission.failures {
        println!("{}", failure);
    }
    println!("Session {}", submission.session_id);

    let mut pending: HashSet<String> = submission
        .documents
        .iter()
        .filter_map(|d| d.id.clone())
        .collect();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while !pending.is_empty() {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!("Interrupted, {} document(s) still processing", pending.len());
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                if let Some(line) = describe(&event) {
                    println!("{}", line);
                }
                if let StatusEvent::ReadinessChanged { doc_id, readiness, .. } = &event {
                    if readiness.is_terminal() {
                        pending.remove(doc_id);
                    }
                }
            }
        }
    }

    workspace.unmount().await;

    for doc in workspace.documents().await {
        println!("{}", summary_line(&doc));
    }
    if mode == UploadMode::Compare {
        let set = workspace.document_set().await;
        println!(
            "Compare {}",
            if gate::can_compare(&set) {
                "available"
            } else {
                "unavailable"
            }
        );
    }
    Ok(())
}

pub async fn status(ctx: Context, id: String) -> anyhow::Result<()> {
    let backend = HttpBackend::new(&ctx.settings, ctx.auth)?;
    let update = backend.fetch_status(&id).await?;

    let readiness = match update.kind() {
        StatusKind::Ready => Readiness::Ready,
        StatusKind::Failed => Readiness::Error,
        StatusKind::Progress => Readiness::Processing,
    };
    match update.message.as_deref().filter(|m| !m.is_empty()) {
        Some(message) => println!("{}: {} ({}) {}", id, readiness, update.status, message),
        None => println!("{}: {} ({})", id, readiness, update.status),
    }
    Ok(())
}

pub async fn sessions(ctx: Context) -> anyhow::Result<()> {
    let backend = HttpBackend::new(&ctx.settings, ctx.auth)?;
    let sessions = backend.list_sessions().await?;

    if sessions.is_empty() {
        println!("No sessions");
    }
    for session in sessions {
        println!(
            "{}\t{}\t{}",
            session.session_id,
            session.title.as_deref().unwrap_or("Untitled"),
            session.created_at.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub async fn session(ctx: Context, id: String) -> anyhow::Result<()> {
    let backend = HttpBackend::new(&ctx.settings, ctx.auth)?;
    let detail = backend.get_session(&id).await?;

    println!(
        "{}\t{}",
        detail.summary.session_id,
        detail.summary.title.as_deref().unwrap_or("Untitled")
    );
    for message in &detail.messages {
        println!("{}", message_line(message));
    }
    Ok(())
}

pub async fn message(ctx: Context, session_id: String, text: String) -> anyhow::Result<()> {
    let backend = HttpBackend::new(&ctx.settings, ctx.auth)?;
    let reply = backend.send_message(&session_id, &text).await?;

    for message in reply.messages.iter().filter(|m| m.role != "user") {
        println!("{}", message_line(message));
    }
    Ok(())
}

pub async fn delete_session(ctx: Context, id: String) -> anyhow::Result<()> {
    let backend = HttpBackend::new(&ctx.settings, ctx.auth)?;
    backend.delete_session(&id).await?;
    println!("Deleted session {}", id);
    Ok(())
}

pub async fn show_config(ctx: Context) -> anyhow::Result<()> {
    println!("# {}", ctx.config.settings_file.display());
    println!("{}", serde_json::to_string_pretty(&ctx.settings)?);
    Ok(())
}

/// Human-readable line for a tracker event; `None` for noise.
fn describe(event: &StatusEvent) -> Option<String> {
    match event {
        StatusEvent::ReadinessChanged {
            doc_id,
            readiness,
            message,
        } if message.is_empty() => Some(format!("{}: {}", doc_id, readiness)),
        StatusEvent::ReadinessChanged {
            doc_id,
            readiness,
            message,
        } => Some(format!("{}: {} - {}", doc_id, readiness, message)),
        StatusEvent::MessageChanged { doc_id, message } => {
            Some(format!("{}: {}", doc_id, message))
        }
        StatusEvent::ReconnectScheduled {
            doc_id, delay_ms, ..
        } => Some(format!(
            "{}: connection lost, reconnecting in {}s",
            doc_id,
            delay_ms / 1000
        )),
        StatusEvent::Connection { .. } | StatusEvent::BecameReady { .. } => None,
    }
}

fn message_line(message: &ChatMessage) -> String {
    let speaker = match message.role.as_str() {
        "user" => "You",
        "ai" => "Assistant",
        other => other,
    };
    format!("{}: {}", speaker, message.text)
}

fn summary_line(doc: &Document) -> String {
    let actions: Vec<String> = gate::permitted_actions(doc)
        .iter()
        .map(|a| a.to_string())
        .collect();
    let id = doc.id.as_deref().unwrap_or("-");

    if actions.is_empty() {
        format!("{}\t{}\t{}", doc.display_name, id, doc.readiness)
    } else {
        format!(
            "{}\t{}\t{}\t{}",
            doc.display_name,
            id,
            doc.readiness,
            actions.join(", ")
        )
    }
}
