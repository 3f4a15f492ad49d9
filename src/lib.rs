pub mod config;
pub mod findings;
pub mod llm;
pub mod submission;

pub use config::Config;
pub use llm::{
    BatchOptions, ClientError, CompletionClient, GenerateOptions, ModelResponse, Prompt,
    UsageStats,
};

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Read a JSON Lines prompt file: one JSON string or message array per line.
pub fn load_prompts(path: &Path) -> Result<Vec<Prompt>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;

    parse_prompts(&contents)
        .with_context(|| format!("Failed to parse prompt file: {}", path.display()))
}

pub fn parse_prompts(contents: &str) -> Result<Vec<Prompt>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let value: serde_json::Value = serde_json::from_str(line)
                .with_context(|| format!("line {}: invalid JSON", index + 1))?;
            Prompt::try_from(value).with_context(|| format!("line {}", index + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;

    #[test]
    fn test_parse_prompts_mixed_shapes() {
        let prompts = parse_prompts(
            "\"plain text\"\n\n[{\"role\": \"user\", \"content\": \"structured\"}]\n",
        )
        .unwrap();

        assert_eq!(
            prompts,
            vec![
                Prompt::Text("plain text".to_string()),
                Prompt::Messages(vec![ChatMessage::user("structured")]),
            ]
        );
    }

    #[test]
    fn test_parse_prompts_reports_line() {
        let err = parse_prompts("\"ok\"\n42\n").unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }
}
