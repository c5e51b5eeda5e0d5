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

/// Answer when no usable context exists
pub const NO_INFORMATION_MESSAGE: &str = "I don't have information about that in the uploaded documents. Add PDFs, text, or website URLs about it in the admin knowledge panel, or check the institution's official website.";

/// Extractive answer found no usable sentence
pub const NOT_ENOUGH_INFORMATION_MESSAGE: &str = "The uploaded documents don't contain enough specific information for that question. Try asking about a particular university or program by name, or check the institution's official website.";

/// Something unexpected broke while answering
pub const APOLOGY_MESSAGE: &str =
    "I couldn't process that question right now. Please try again or rephrase.";

/// Prefix of every extractive answer
pub const EXTRACTIVE_PREFIX: &str = "Based on the uploaded documents: ";

/// Marker appended to context cut down to the provider budget
pub const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// Separates the instructions from the retrieved context in the system prompt
pub const CONTEXT_DELIMITER: &str = "\n\n--- Retrieved context (use this only) ---\n";

pub const RAG_SYSTEM_PROMPT: &str = r#"You are a university information assistant. The ONLY source of information you may use is the retrieved context below (from the uploaded PDFs, text, and websites). You must NOT use your general knowledge or add any information that is not explicitly written in that context.

STRICT RULES (anti-hallucination):
- Every fact, number, name, or detail in your answer MUST appear in the context below. If the context does not say something, do NOT say it.
- Do not add examples, comparisons, or details from outside the context. Do not fill in gaps with your own knowledge.
- If the context does not contain enough information to answer the question, reply with a short sentence like: "That information is not in the uploaded documents. You can check the university's official website for more details." Do not guess or infer.
- If the context talks about ONE university only, answer ONLY about that university. Do not mention or compare others.
- If the user asks to COMPARE two universities and the context has sections "=== ... ===" for each, use only those sections and give a comparison based only on what is written there.
- Write in clear, short sentences. Do not say "according to the context" or "the context says.""#;

/// Fetched web pages with less text than this are rejected
pub const MIN_WEBSITE_TEXT_CHARS: usize = 50;
