//! Prompt templates for the system preamble and the best-effort fallback.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::commands::CommandDescriptor;
use crate::io::config::TemplatesConfig;
use crate::model::Message;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const BEST_EFFORT_TEMPLATE: &str = include_str!("prompts/best_effort.md");

/// Template engine wrapper around minijinja.
#[derive(Debug)]
pub struct PromptTemplates {
    env: Environment<'static>,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::from_sources(SYSTEM_TEMPLATE.to_string(), BEST_EFFORT_TEMPLATE.to_string())
            .expect("embedded templates should be valid")
    }
}

impl PromptTemplates {
    /// Compiles both templates from source.
    pub fn from_sources(system: String, best_effort: String) -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template_owned("system", system)?;
        env.add_template_owned("best_effort", best_effort)?;
        Ok(Self { env })
    }

    /// Embedded templates, overridden by any paths set in `config`.
    pub fn load(config: &TemplatesConfig) -> Result<Self> {
        let system = match &config.system {
            Some(path) => read_template(path)?,
            None => SYSTEM_TEMPLATE.to_string(),
        };
        let best_effort = match &config.best_effort {
            Some(path) => read_template(path)?,
            None => BEST_EFFORT_TEMPLATE.to_string(),
        };
        Self::from_sources(system, best_effort).context("compile prompt templates")
    }

    /// Protocol preamble: the user's system text followed by the command rules.
    pub fn render_system(
        &self,
        system_prefix: &str,
        commands: &[CommandDescriptor],
        reply_command: &str,
    ) -> Result<String, minijinja::Error> {
        let template = self.env.get_template("system")?;
        template.render(context! {
            system_prefix => system_prefix.trim(),
            commands => commands,
            reply_command => reply_command,
        })
    }

    /// Plain-text prompt used when the command protocol has been abandoned.
    pub fn render_best_effort(
        &self,
        message: &str,
        error: &str,
        dialogue: &[Message],
    ) -> Result<String, minijinja::Error> {
        let template = self.env.get_template("best_effort")?;
        template.render(context! {
            message => message,
            error => error.trim(),
            dialogue => dialogue,
        })
    }
}

fn read_template(path: &Path) -> Result<String> {
    debug!(path = %path.display(), "loading prompt template override");
    fs::read_to_string(path).with_context(|| format!("read prompt template {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn descriptors() -> Vec<CommandDescriptor> {
        vec![
            CommandDescriptor {
                name: "reply".to_string(),
                description: "Answer the user.".to_string(),
                terminal: true,
            },
            CommandDescriptor {
                name: "search".to_string(),
                description: String::new(),
                terminal: false,
            },
        ]
    }

    /// The user's system text must precede the protocol rules.
    #[test]
    fn system_prefix_comes_first() {
        let rendered = PromptTemplates::default()
            .render_system("  Be brief.  ", &descriptors(), "reply")
            .expect("render");
        assert!(rendered.starts_with("Be brief.\n\n"), "{rendered}");
        assert!(rendered.contains("- reply: Answer the user."));
        assert!(rendered.contains("- search\n"));
        assert!(rendered.contains("\"reply\" command"));
    }

    #[test]
    fn empty_prefix_is_omitted() {
        let rendered = PromptTemplates::default()
            .render_system("", &descriptors(), "reply")
            .expect("render");
        assert!(rendered.starts_with("You communicate only through commands."));
    }

    #[test]
    fn best_effort_includes_error_dialogue_and_message() {
        let rendered = PromptTemplates::default()
            .render_best_effort(
                "What is the weather?",
                "missing required field 'commands'",
                &[
                    Message::assistant("{\"commands\": []}"),
                    Message::user("{\"responses\": []}"),
                ],
            )
            .expect("render");
        let error_pos = rendered.find("missing required field").expect("error");
        let dialogue_pos = rendered.find("assistant: {\"commands\": []}").expect("dialogue");
        let message_pos = rendered.find("What is the weather?").expect("message");
        assert!(error_pos < dialogue_pos, "error before dialogue");
        assert!(dialogue_pos < message_pos, "dialogue before message");
    }

    #[test]
    fn best_effort_without_dialogue_skips_section() {
        let rendered = PromptTemplates::default()
            .render_best_effort("hi", "boom", &[])
            .expect("render");
        assert!(!rendered.contains("intermediate requests"));
    }

    #[test]
    fn overrides_are_read_from_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("system.md");
        fs::write(&path, "custom {{ reply_command }}").expect("write");
        let templates = PromptTemplates::load(&TemplatesConfig {
            system: Some(path),
            best_effort: None,
        })
        .expect("load");
        assert_eq!(
            templates
                .render_system("", &[], "answer")
                .expect("render"),
            "custom answer"
        );
    }

    #[test]
    fn missing_override_reports_path() {
        let error = PromptTemplates::load(&TemplatesConfig {
            system: None,
            best_effort: Some(PathBuf::from("/nonexistent/best_effort.md")),
        })
        .expect_err("missing file");
        assert!(format!("{error:#}").contains("/nonexistent/best_effort.md"));
    }
}
