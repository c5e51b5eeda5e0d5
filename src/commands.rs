// Copyright 2026 Muvon Un Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use colored::Colorize;
use std::io::Read;
use std::sync::Arc;

use crate::cli::{Commands, IndexCommand};
use crate::config::Config;
use crate::knowledge::formatting::{format_chunk_list, format_index_result, format_stats};
use crate::knowledge::types::SourceType;
use crate::knowledge::{ContextOutcome, KnowledgeManager};
use crate::mcp::McpServer;

pub async fn execute(config: &Config, command: Commands) -> Result<()> {
    let manager = KnowledgeManager::new(config).await?;

    match command {
        Commands::Ask { question, context } => {
            let question = question.join(" ");
            if question.trim().is_empty() {
                anyhow::bail!("Question cannot be empty");
            }

            if context {
                match manager.prepare_context(&question).await {
                    ContextOutcome::Found(block) => println!("{}", block.text),
                    ContextOutcome::NoMatch => println!("{}", "No matching documents".yellow()),
                    ContextOutcome::EntityMismatch => println!(
                        "{}",
                        "Documents found, but none mention the asked institution".yellow()
                    ),
                }
            } else {
                println!("{}", manager.answer_question(&question).await);
            }
        }

        Commands::Index { command } => {
            let (title, result) = match command {
                IndexCommand::Text { title, content } => {
                    let content = match content {
                        Some(c) => c,
                        None => {
                            let mut buffer = String::new();
                            std::io::stdin()
                                .read_to_string(&mut buffer)
                                .context("Failed to read content from stdin")?;
                            buffer
                        }
                    };
                    let result = manager
                        .index_content(&title, &content, SourceType::Text)
                        .await?;
                    (title, result)
                }
                IndexCommand::Pdf { path, title } => {
                    let result = manager.index_pdf(&path, title.as_deref()).await?;
                    (title.unwrap_or_else(|| path.display().to_string()), result)
                }
                IndexCommand::Url { url, title } => {
                    let result = manager.index_url(&url, title.as_deref()).await?;
                    (title.unwrap_or(url), result)
                }
            };
            println!("{}", format_index_result(&title, &result));
        }

        Commands::List { limit, format } => {
            let chunks = manager.list(Some(limit)).await?;
            if format == "json" {
                let rows: Vec<_> = chunks
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "id": c.id,
                            "title": c.title,
                            "source_type": c.source_type,
                            "length": c.content.len(),
                            "created_at": c.created_at,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{}", format_chunk_list(&chunks));
            }
        }

        Commands::Delete { id } => {
            if manager.delete(&id).await? {
                println!("{} {}", "Deleted".green().bold(), id);
            } else {
                anyhow::bail!("No chunk with id {}", id);
            }
        }

        Commands::Stats => {
            let stats = manager.stats().await?;
            print!("{}", format_stats(&stats));
        }

        Commands::Mcp => {
            let server = McpServer::new(Arc::new(manager));
            server.run().await?;
        }
    }

    Ok(())
}
