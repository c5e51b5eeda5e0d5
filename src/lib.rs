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

//! Question answering over uploaded documents about Ethiopian universities.
//!
//! Questions are resolved against a fixed registry of universities so that
//! single-university answers stay pure and comparisons get one labelled
//! section per university. Embedding and generation providers are optional;
//! without them the engine uses hash-derived vectors and extractive answers.

pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod embedding;
pub mod errors;
pub mod generation;
pub mod knowledge;
pub mod mcp;
pub mod storage;
pub mod vector_optimizer;
