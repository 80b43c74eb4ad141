use anyhow::{Context, Result};
use minijinja::{context, Environment, Error, ErrorKind};
use std::sync::Arc;

use crate::models::chat::Turn;

const TEMPLATE_NAME: &str = "chat_template";

/// Jinja chat template shipped with a model (HuggingFace `chat_template` format)
///
/// The source is compiled once in `new`; a template that does not parse is rejected there.
#[derive(Clone)]
pub struct ChatTemplate {
    bos_token: String,
    eos_token: String,
    env: Arc<Environment<'static>>,
}

impl ChatTemplate {
    pub fn new(
        source: impl Into<String>,
        bos_token: Option<String>,
        eos_token: Option<String>,
    ) -> Result<Self> {
        let mut env = Environment::new();
        // Same whitespace handling transformers applies to chat templates
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        // str.strip(), .startswith(), dict.items() and friends
        env.set_unknown_method_callback(minijinja_contrib::pycompat::unknown_method_callback);
        env.add_function("raise_exception", |message: String| -> Result<String, Error> {
            Err(Error::new(ErrorKind::InvalidOperation, message))
        });
        env.add_template_owned(TEMPLATE_NAME, source.into())
            .context("Failed to compile chat template")?;

        Ok(Self {
            bos_token: bos_token.unwrap_or_default(),
            eos_token: eos_token.unwrap_or_default(),
            env: Arc::new(env),
        })
    }

    /// Render turns into a prompt string, optionally opening the assistant turn.
    pub fn render(&self, turns: &[Turn], add_generation_prompt: bool) -> Result<String> {
        let template = self
            .env
            .get_template(TEMPLATE_NAME)
            .context("Chat template missing from environment")?;

        template
            .render(context! {
                messages => turns,
                add_generation_prompt => add_generation_prompt,
                bos_token => &self.bos_token,
                eos_token => &self.eos_token,
            })
            .context("Failed to render chat template")
    }
}

impl std::fmt::Debug for ChatTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatTemplate")
            .field("bos_token", &self.bos_token)
            .field("eos_token", &self.eos_token)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHATML: &str = "{% for message in messages %}\
{{ '<|im_start|>' + message['role'] + '\\n' + message['content'] + '<|im_end|>' + '\\n' }}\
{% endfor %}\
{% if add_generation_prompt %}{{ '<|im_start|>assistant\\n' }}{% endif %}";

    #[test]
    fn test_render_chatml_with_generation_prompt() {
        let template = ChatTemplate::new(CHATML, None, None).unwrap();
        let turns = vec![Turn::system("Be brief."), Turn::user("Hello")];

        let prompt = template.render(&turns, true).unwrap();

        assert_eq!(
            prompt,
            "<|im_start|>system\nBe brief.<|im_end|>\n\
<|im_start|>user\nHello<|im_end|>\n\
<|im_start|>assistant\n"
        );
    }

    #[test]
    fn test_render_without_generation_prompt() {
        let template = ChatTemplate::new(CHATML, None, None).unwrap();
        let prompt = template.render(&[Turn::user("Hi")], false).unwrap();
        assert!(!prompt.ends_with("<|im_start|>assistant\n"));
    }

    #[test]
    fn test_raise_exception_surfaces_as_error() {
        let template = ChatTemplate::new(
            "{% if messages[0]['role'] != 'system' %}{{ raise_exception('system first') }}{% endif %}",
            None,
            None,
        )
        .unwrap();
        assert!(template.render(&[Turn::user("Hi")], true).is_err());
    }

    #[test]
    fn test_bos_token_is_exposed() {
        let template =
            ChatTemplate::new("{{ bos_token }}{{ messages[0]['content'] }}", Some("<s>".to_string()), None)
                .unwrap();
        assert_eq!(template.render(&[Turn::user("x")], true).unwrap(), "<s>x");
    }

    #[test]
    fn test_python_string_methods_are_supported() {
        let template = ChatTemplate::new(
            "{% for m in messages %}{{ m['content'].strip() }}|\
{% if m['role'].startswith('us') %}U{% endif %};{% endfor %}",
            None,
            None,
        )
        .unwrap();

        let prompt = template
            .render(&[Turn::system("  sys  "), Turn::user(" hi\n")], false)
            .unwrap();
        assert_eq!(prompt, "sys|;hi|U;");
    }

    #[test]
    fn test_unparseable_template_is_rejected_up_front() {
        assert!(ChatTemplate::new("{% for m in messages %}{{ m }}", None, None).is_err());
    }
}
