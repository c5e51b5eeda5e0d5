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

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "unibrain")]
#[command(version, author = "Muvon Un Limited <opensource@muvon.io>")]
#[command(about = "Question answering over uploaded university documents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a question from the indexed documents
    Ask {
        /// The question, e.g. "Compare AAU and ASTU"
        question: Vec<String>,

        /// Print the assembled context instead of an answer
        #[arg(long)]
        context: bool,
    },

    /// Add a document to the knowledge base
    Index {
        #[command(subcommand)]
        command: IndexCommand,
    },

    /// List indexed chunks, newest first
    List {
        /// Maximum number of chunks to show
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Permanently remove a chunk
    Delete {
        /// Chunk ID (see `list`)
        id: String,
    },

    /// Show knowledge base statistics
    Stats,

    /// Start MCP server (Model Context Protocol) exposing question answering
    Mcp,
}

#[derive(Subcommand, Debug)]
pub enum IndexCommand {
    /// Index raw text
    Text {
        #[arg(short, long)]
        title: String,

        /// Text to index; read from stdin when omitted
        #[arg(short, long)]
        content: Option<String>,
    },

    /// Extract and index the text of a PDF file
    Pdf {
        path: PathBuf,

        /// Title, defaults to the file name
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Fetch a web page and index its text
    Url {
        url: String,

        /// Title, defaults to the URL
        #[arg(short, long)]
        title: Option<String>,
    },
}
