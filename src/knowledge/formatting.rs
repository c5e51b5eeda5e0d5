use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::embedding::truncate_chars;
use crate::knowledge::types::{IndexResult, KnowledgeChunk, KnowledgeStats};

pub fn format_stats(stats: &KnowledgeStats) -> String {
    let mut output = String::new();

    output.push_str(&"Knowledge Base Statistics".bold().to_string());
    output.push('\n');
    output.push_str(&format!("Total Sources: {}", stats.total_sources));
    output.push('\n');
    output.push_str(&format!("Total Chunks: {}", stats.total_chunks));
    output.push('\n');

    if stats.total_sources > 0 {
        let avg = stats.total_chunks / stats.total_sources;
        output.push_str(&format!("Average Chunks/Source: {}", avg));
        output.push('\n');
    }

    if let Some(oldest) = stats.oldest_indexed {
        output.push_str(&format!("Oldest Indexed: {}", format_relative_time(oldest)));
        output.push('\n');
    }

    if let Some(newest) = stats.newest_indexed {
        output.push_str(&format!("Newest Indexed: {}", format_relative_time(newest)));
        output.push('\n');
    }

    output
}

pub fn format_chunk_list(chunks: &[KnowledgeChunk]) -> String {
    if chunks.is_empty() {
        return "No documents indexed".to_string();
    }

    let mut output = String::new();

    output.push_str(
        &format!(
            "{:<38} {:<42} {:<8} {:>8} {}\n",
            "ID", "Title", "Type", "Length", "Indexed"
        )
        .bold()
        .to_string(),
    );
    output.push_str(&"─".repeat(120));
    output.push('\n');

    for chunk in chunks {
        let title = if chunk.title.len() > 40 {
            format!("{}...", truncate_chars(&chunk.title, 37))
        } else {
            chunk.title.clone()
        };

        output.push_str(&format!(
            "{:<38} {:<42} {:<8} {:>8} {}\n",
            chunk.id,
            title,
            chunk.source_type.to_string(),
            chunk.content.len(),
            format_relative_time(chunk.created_at)
        ));
    }

    output
}

pub fn format_index_result(title: &str, result: &IndexResult) -> String {
    format!(
        "{} '{}': {} chunk(s), {} characters",
        "Indexed".green().bold(),
        title,
        result.chunk_count,
        result.total_length
    )
}

fn format_relative_time(dt: DateTime<Utc>) -> String {
    let now = Utc::now();
    let duration = now.signed_duration_since(dt);

    if duration.num_days() > 0 {
        format!("{} days ago", duration.num_days())
    } else if duration.num_hours() > 0 {
        format!("{} hours ago", duration.num_hours())
    } else if duration.num_minutes() > 0 {
        format!("{} minutes ago", duration.num_minutes())
    } else {
        "just now".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::types::SourceType;
    use chrono::Duration;

    #[test]
    fn test_relative_time() {
        assert_eq!(format_relative_time(Utc::now()), "just now");
        assert_eq!(
            format_relative_time(Utc::now() - Duration::hours(3)),
            "3 hours ago"
        );
        assert_eq!(
            format_relative_time(Utc::now() - Duration::days(2)),
            "2 days ago"
        );
    }

    #[test]
    fn test_chunk_list_truncates_long_titles() {
        colored::control::set_override(false);
        let chunk = KnowledgeChunk::new(
            "Addis Ababa University Graduate Programs Handbook (part 1/4)".to_string(),
            "content".to_string(),
            SourceType::Pdf,
            vec![],
        );
        let output = format_chunk_list(&[chunk.clone()]);

        assert!(output.contains(&chunk.id));
        assert!(output.contains("Addis Ababa University Graduate Progr..."));
        assert!(output.contains("pdf"));
        assert_eq!(format_chunk_list(&[]), "No documents indexed");
    }

    #[test]
    fn test_stats_average() {
        colored::control::set_override(false);
        let stats = KnowledgeStats {
            total_chunks: 9,
            total_sources: 3,
            oldest_indexed: None,
            newest_indexed: None,
        };
        let output = format_stats(&stats);
        assert!(output.contains("Total Sources: 3"));
        assert!(output.contains("Average Chunks/Source: 3"));
        assert!(!output.contains("Oldest"));
    }
}
