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

use serde_json::{json, Value};
use std::sync::Arc;

use crate::knowledge::types::SourceType;
use crate::knowledge::KnowledgeManager;
use crate::mcp::types::{McpError, McpTool};

const MAX_QUESTION_CHARS: usize = 2000;

/// Question answering and ingestion tools
#[derive(Clone)]
pub struct KnowledgeProvider {
    manager: Arc<KnowledgeManager>,
}

impl KnowledgeProvider {
    pub fn new(manager: Arc<KnowledgeManager>) -> Self {
        Self { manager }
    }

    pub fn get_tool_definitions() -> Vec<McpTool> {
        vec![
            McpTool {
                name: "ask_question".to_string(),
                description: "Answer a question about Ethiopian universities using only the uploaded documents. Name a university to restrict the answer to it, or name two to get a side-by-side comparison. Questions about institutions that were never uploaded are answered with a short 'not in the uploaded documents' message.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "question": {
                            "type": "string",
                            "description": "The question in natural language (e.g. 'Compare AAU and ASTU', 'Tell me about Jimma University only')",
                            "minLength": 1,
                            "maxLength": MAX_QUESTION_CHARS
                        }
                    },
                    "required": ["question"],
                    "additionalProperties": false
                }),
            },
            McpTool {
                name: "index_knowledge".to_string(),
                description: "Add a document to the knowledge base. Long documents are split into parts automatically.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "title": {
                            "type": "string",
                            "description": "Document title, ideally naming the university"
                        },
                        "content": {
                            "type": "string",
                            "description": "Plain text of the document"
                        },
                        "source_type": {
                            "type": "string",
                            "enum": ["text", "pdf", "website"],
                            "default": "text"
                        }
                    },
                    "required": ["title", "content"],
                    "additionalProperties": false
                }),
            },
        ]
    }

    pub async fn execute_ask_question(&self, arguments: &Value) -> Result<String, McpError> {
        let question = required_str(arguments, "question", "ask_question")?;
        if question.chars().count() > MAX_QUESTION_CHARS {
            return Err(McpError::invalid_params(
                format!("Question exceeds {} characters", MAX_QUESTION_CHARS),
                "ask_question",
            ));
        }

        Ok(self.manager.answer_question(question).await)
    }

    pub async fn execute_index_knowledge(&self, arguments: &Value) -> Result<String, McpError> {
        let title = required_str(arguments, "title", "index_knowledge")?;
        let content = required_str(arguments, "content", "index_knowledge")?;
        let source_type = arguments
            .get("source_type")
            .and_then(|v| v.as_str())
            .map(SourceType::from)
            .unwrap_or_default();

        let result = self
            .manager
            .index_content(title, content, source_type)
            .await
            .map_err(|e| {
                McpError::internal_error(format!("Indexing failed: {}", e), "index_knowledge")
            })?;

        Ok(format!(
            "Indexed '{}' as {} chunk(s), {} characters",
            title.trim(),
            result.chunk_count,
            result.total_length
        ))
    }
}

fn required_str<'a>(
    arguments: &'a Value,
    name: &str,
    operation: &str,
) -> Result<&'a str, McpError> {
    arguments
        .get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            McpError::invalid_params(format!("Missing required parameter: {}", name), operation)
        })
}
