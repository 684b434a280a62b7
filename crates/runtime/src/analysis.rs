//! Post-Execution Analyzer
//!
//! Turns the flushed output of a completed command into a follow-up chat
//! request. The answer streams back through the normal chat path.

use sentinel_core::AnalysisConfig;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PostExecutionAnalyzer {
    config: AnalysisConfig,
}

impl PostExecutionAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// The analysis instruction for `output`, or `None` when there is nothing to analyze.
    pub fn request_for(&self, command: &str, exit_code: Option<i32>, output: &str) -> Option<String> {
        if !self.config.enabled || output.trim().is_empty() {
            return None;
        }

        let body = truncate(output, self.config.max_chars, &self.config.truncation_marker);
        let exit = exit_code.map_or_else(|| "unknown".to_string(), |code| code.to_string());
        debug!(command, %exit, chars = body.chars().count(), "building analysis request");

        Some(format!(
            "Command output (`{}`, exit code {}):\n```\n{}\n```\n\nProvide a brief analysis of this output.",
            command, exit, body
        ))
    }
}

impl Default for PostExecutionAnalyzer {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

/// Keep the first `max_chars` characters, then append `marker`.
pub fn truncate(text: &str, max_chars: usize, marker: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], marker),
        None => text.to_string(),
    }
}
