use std::path::Path;
use std::time::Duration;

use anyhow::bail;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use inquire::error::InquireResult;

mod annotate;
mod app;
mod backup;
mod chat;
mod cli;
mod config;
mod eid;
mod inference;
mod intent;
mod language;
mod notes;
mod recall;
mod scoring;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use app::{AppBackend, AppFactory};
use notes::{ListQuery, NoteDraft, NoteKind};

pub fn parse_tags(tags: String) -> Vec<String> {
    tags.split(',')
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
}

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = cli::Args::parse();

    match args.command {
        cli::Command::Daemon {} => {
            let paths = AppFactory::get_paths()?;
            let app = AppFactory::create_local_app(&paths)?;
            web::start_daemon(app);
            Ok(())
        }

        cli::Command::Backup { output } => {
            let paths = AppFactory::get_paths()?;
            backup::create_backup(output, Path::new(&paths.base_path))
        }

        cli::Command::Import { archive, yes } => {
            let paths = AppFactory::get_paths()?;
            backup::import_backup(archive.as_deref(), yes, Path::new(&paths.base_path))
        }

        command => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(handle(command)),
    }
}

async fn handle(command: cli::Command) -> anyhow::Result<()> {
    let paths = AppFactory::get_paths()?;
    let backend = AppFactory::create_backend(&paths)?;

    match command {
        cli::Command::Add {
            text,
            image,
            language,
        } => {
            let image_data = match image {
                Some(path) => Some(STANDARD.encode(std::fs::read(&path)?)),
                None => None,
            };

            let draft = NoteDraft {
                text,
                image_data,
                language,
            };

            let spinner = spinner("annotating");
            let note = backend.capture(draft).await;
            spinner.finish_and_clear();

            println!("{}", serde_json::to_string_pretty(&note?).unwrap());
            Ok(())
        }

        cli::Command::Ask {
            query,
            language,
            json,
        } => {
            let spinner = spinner("thinking");
            let response = backend.recall(query, language).await;
            spinner.finish_and_clear();
            let response = response?;

            if json {
                println!("{}", serde_json::to_string_pretty(&response).unwrap());
                return Ok(());
            }

            println!("{}", response.answer);
            if !response.related_ids.is_empty() {
                println!();
                for id in &response.related_ids {
                    println!("  ref: {id}");
                }
            }
            Ok(())
        }

        cli::Command::Search {
            text,
            category,
            tags,
            kind,
            limit,
            count,
        } => {
            let kind = match kind.as_deref() {
                None => None,
                Some("text") => Some(NoteKind::Text),
                Some("image") => Some(NoteKind::Image),
                Some("link") => Some(NoteKind::Link),
                Some(other) => bail!("unknown kind {other:?}, expected text, image or link"),
            };

            let query = ListQuery {
                id: None,
                text,
                category,
                tags: tags.map(parse_tags),
                kind,
                limit,
            };

            let notes = backend.search(query).await?;

            if count {
                println!("{} notes found", notes.len());
                return Ok(());
            }

            println!("{}", serde_json::to_string_pretty(&notes).unwrap());
            Ok(())
        }

        cli::Command::Delete { id, yes } => {
            if !yes {
                match inquire::prompt_confirmation(format!("Delete note {id}?")) {
                    InquireResult::Ok(true) => {}
                    InquireResult::Ok(false) => return Ok(()),
                    InquireResult::Err(err) => bail!("An error occurred: {}", err),
                }
            }

            backend.delete(id.into()).await?;
            println!("note deleted");
            Ok(())
        }

        cli::Command::Categories {} => {
            let categories = backend.categories().await?;
            println!("{}", serde_json::to_string_pretty(&categories).unwrap());
            Ok(())
        }

        cli::Command::Tags {} => {
            let tags = backend.tags().await?;
            println!("{}", serde_json::to_string_pretty(&tags).unwrap());
            Ok(())
        }

        cli::Command::Reembed {} => {
            let spinner = spinner("re-embedding");
            let report = backend.reembed().await;
            spinner.finish_and_clear();
            let report = report?;

            println!(
                "{} embedded, {} skipped, {} failed",
                report.embedded, report.skipped, report.failed
            );
            Ok(())
        }

        cli::Command::Daemon {} | cli::Command::Backup { .. } | cli::Command::Import { .. } => {
            unreachable!("handled before the runtime is built")
        }
    }
}

fn spinner(message: &str) -> indicatif::ProgressBar {
    let spinner = indicatif::ProgressBar::new_spinner();
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}
