use anyhow::Result;

use crate::models::chat::{Role, Turn};
use crate::services::backend::{ChatTemplate, GenerationBackend};

/// Turns rendered by the plain strategy
const PLAIN_PROMPT_TURNS: usize = 12;

/// How a session's turns become a prompt string
#[derive(Debug, Clone)]
pub enum PromptStrategy {
    /// Full retained history through the model's chat template
    Templated(ChatTemplate),
    /// `Role: content` lines over the most recent turns
    Plain,
}

impl PromptStrategy {
    /// Pick the strategy from the backend's capabilities.
    pub fn for_backend(backend: &dyn GenerationBackend) -> Self {
        match backend.chat_template() {
            Some(template) => Self::Templated(template.clone()),
            None => Self::Plain,
        }
    }

    pub fn is_templated(&self) -> bool {
        matches!(self, Self::Templated(_))
    }

    pub fn build(&self, turns: &[Turn]) -> Result<String> {
        match self {
            Self::Templated(template) => template.render(turns, true),
            Self::Plain => Ok(plain_prompt(turns)),
        }
    }

    /// Clean up raw model output.
    pub fn post_process(&self, raw: &str) -> String {
        let response = raw.trim();
        if self.is_templated() {
            strip_assistant_prefix(response)
        } else {
            response.to_string()
        }
    }
}

fn plain_prompt(turns: &[Turn]) -> String {
    let start = turns.len().saturating_sub(PLAIN_PROMPT_TURNS);
    let mut lines: Vec<String> = turns[start..]
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
        .collect();
    lines.push(format!("{}:", Role::Assistant.label()));
    lines.join("\n")
}

/// Drop a leading `assistant:` echo (case-insensitive), keeping the text after the first colon.
fn strip_assistant_prefix(response: &str) -> String {
    const PREFIX: &str = "assistant:";
    let has_prefix = response
        .get(..PREFIX.len())
        .map(|head| head.eq_ignore_ascii_case(PREFIX))
        .unwrap_or(false);

    if has_prefix {
        response[PREFIX.len()..].trim().to_string()
    } else {
        response.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::support::{chatml_template, StubBackend};

    #[test]
    fn test_plain_prompt_format() {
        let turns = vec![
            Turn::system("Be brief."),
            Turn::user("Hello"),
        ];
        let prompt = PromptStrategy::Plain.build(&turns).unwrap();
        assert_eq!(prompt, "System: Be brief.\nUser: Hello\nAssistant:");
    }

    #[test]
    fn test_plain_prompt_uses_last_twelve_turns() {
        let mut turns = vec![Turn::system("sys")];
        for i in 0..10 {
            turns.push(Turn::user(format!("u{}", i)));
            turns.push(Turn::assistant(format!("a{}", i)));
        }
        turns.push(Turn::user("latest"));

        let prompt = PromptStrategy::Plain.build(&turns).unwrap();
        let lines: Vec<&str> = prompt.lines().collect();

        assert_eq!(lines.len(), 13);
        assert_eq!(lines[0], "Assistant: a4");
        assert_eq!(lines[11], "User: latest");
        assert_eq!(lines[12], "Assistant:");
        assert!(!prompt.contains("System: sys"));
    }

    #[test]
    fn test_templated_prompt_renders_full_history() {
        let strategy = PromptStrategy::Templated(chatml_template());
        let mut turns = vec![Turn::system("sys")];
        for i in 0..10 {
            turns.push(Turn::user(format!("u{}", i)));
            turns.push(Turn::assistant(format!("a{}", i)));
        }

        let prompt = strategy.build(&turns).unwrap();
        assert!(prompt.starts_with("<|im_start|>system\nsys<|im_end|>"));
        assert!(prompt.contains("u0"));
        assert!(prompt.ends_with("<|im_start|>assistant\n"));
    }

    #[test]
    fn test_strategy_follows_backend_capability() {
        assert!(!PromptStrategy::for_backend(&StubBackend::new("m")).is_templated());
        assert!(PromptStrategy::for_backend(&StubBackend::templated("m")).is_templated());
    }

    #[test]
    fn test_post_process_strips_prefix_only_when_templated() {
        let templated = PromptStrategy::Templated(chatml_template());
        assert_eq!(templated.post_process("  Assistant: Olá!  "), "Olá!");
        assert_eq!(templated.post_process("ASSISTANT:Oi: tudo bem"), "Oi: tudo bem");
        assert_eq!(templated.post_process("Sure thing"), "Sure thing");

        assert_eq!(PromptStrategy::Plain.post_process(" Assistant: hi "), "Assistant: hi");
    }

    #[test]
    fn test_strip_prefix_handles_short_and_multibyte_input() {
        assert_eq!(strip_assistant_prefix("ok"), "ok");
        assert_eq!(strip_assistant_prefix("ããããããããããã"), "ããããããããããã");
    }
}
