//! Developer CLI for the command-chain engine.
//!
//! Replays a conversation turn against a scripted model and prints every
//! callback event, so prompt and protocol changes can be checked without a
//! live model.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;

use command_chain::chain::{
    ChainCallback, ChainOutcome, CommandCallback, CommandChain, ResultCallback,
};
use command_chain::commands::{CommandRegistry, CommandResult, Echo, Reply};
use command_chain::history::{ConversationMessage, History};
use command_chain::io::config::{ChainConfig, load_config};
use command_chain::io::prompt::PromptTemplates;
use command_chain::logging;
use command_chain::scripted::{Script, ScriptedModel};

#[derive(Parser)]
#[command(
    name = "command-chain",
    version,
    about = "Streaming command-protocol engine for chat models"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one chat turn against scripted model responses.
    Replay {
        /// JSON array of conversation messages ending with a user message.
        #[arg(long)]
        history: PathBuf,
        /// JSON script of model responses.
        #[arg(long)]
        script: PathBuf,
        /// Engine config (TOML). Defaults apply when missing.
        #[arg(long, default_value = "command-chain.toml")]
        config: PathBuf,
    },
    /// Print the system preamble sent to the model.
    RenderSystem {
        #[arg(long, default_value = "command-chain.toml")]
        config: PathBuf,
        /// User-supplied system text placed before the protocol rules.
        #[arg(long, default_value = "")]
        system: String,
    },
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Replay {
            history,
            script,
            config,
        } => cmd_replay(&history, &script, &config),
        Command::RenderSystem { config, system } => cmd_render_system(&config, &system),
    }
}

fn cmd_replay(history_path: &Path, script_path: &Path, config_path: &Path) -> Result<()> {
    let cfg = load_config(config_path)?;
    let templates = PromptTemplates::load(&cfg.templates)?;
    let registry = build_registry(&cfg)?;

    let conversation: Vec<ConversationMessage> = read_json(history_path)?;
    let history = History::from_conversation(&conversation).context("build history")?;
    let script: Script = read_json(script_path)?;
    let model = ScriptedModel::new(script);

    let chain = CommandChain::new(&model, &registry, &templates, &cfg);
    let mut printer = Printer {
        out: io::stdout().lock(),
    };
    let outcome = chain
        .run_chat(history, &mut printer)
        .context("run chat turn")?;
    let label = match outcome {
        ChainOutcome::Replied => "replied",
        ChainOutcome::BestEffort => "best effort",
    };
    writeln!(printer.out, "\n[outcome] {label}").context("write stdout")?;
    Ok(())
}

fn cmd_render_system(config_path: &Path, system: &str) -> Result<()> {
    let cfg = load_config(config_path)?;
    let templates = PromptTemplates::load(&cfg.templates)?;
    let registry = build_registry(&cfg)?;
    let preamble = templates
        .render_system(system, &registry.descriptors(), &cfg.reply_command)
        .context("render system template")?;
    println!("{preamble}");
    Ok(())
}

fn build_registry(cfg: &ChainConfig) -> Result<CommandRegistry> {
    let reply_command = cfg.reply_command.clone();
    let registry = CommandRegistry::new()
        .with(cfg.reply_command.clone(), move || {
            Box::new(Reply::new(reply_command.clone()))
        })
        .and_then(|registry| registry.with("echo", || Box::new(Echo)))
        .context("register commands")?;
    Ok(registry)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

/// Writes callback events to stdout as they arrive.
///
/// Write failures are ignored; the chain itself has already done the work.
struct Printer<W: Write> {
    out: W,
}

impl<W: Write> ChainCallback for Printer<W> {
    fn command_callback(&mut self) -> Box<dyn CommandCallback + '_> {
        Box::new(CommandPrinter { out: &mut self.out })
    }

    fn result_callback(&mut self) -> Box<dyn ResultCallback + '_> {
        Box::new(ResultPrinter { out: &mut self.out })
    }

    fn on_state(&mut self, request: &str, response: &str) {
        let _ = writeln!(self.out, "[state] {request}\n[state] {response}");
    }

    fn on_error(&mut self, title: &str, error: &str) {
        let _ = writeln!(self.out, "[error] {title}: {error}");
    }

    fn on_discarded_messages(&mut self, count: usize) {
        let _ = writeln!(self.out, "[trim] discarded {count} messages");
    }
}

struct CommandPrinter<'a> {
    out: &'a mut dyn Write,
}

impl CommandCallback for CommandPrinter<'_> {
    fn on_command(&mut self, name: &str) {
        let _ = write!(self.out, "[command] {name}(");
    }

    fn on_arg_start(&mut self) {
        let _ = write!(self.out, " ");
    }

    fn on_arg(&mut self, chunk: &str) {
        let _ = write!(self.out, "{chunk}");
    }

    fn on_args_end(&mut self) {
        let _ = writeln!(self.out, " )");
    }

    fn on_output(&mut self, chunk: &str) {
        let _ = writeln!(self.out, "[output] {chunk}");
    }

    fn on_result(&mut self, result: &CommandResult) {
        let _ = writeln!(self.out, "[result] {:?}: {}", result.status, result.response);
    }
}

struct ResultPrinter<'a> {
    out: &'a mut dyn Write,
}

impl ResultCallback for ResultPrinter<'_> {
    fn on_start(&mut self) {
        let _ = write!(self.out, "[reply] ");
    }

    fn on_result(&mut self, chunk: &str) {
        let _ = write!(self.out, "{chunk}");
        let _ = self.out.flush();
    }

    fn on_end(&mut self) {
        let _ = writeln!(self.out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_replay() {
        let cli = Cli::parse_from([
            "command-chain",
            "replay",
            "--history",
            "h.json",
            "--script",
            "s.json",
        ]);
        match cli.command {
            Command::Replay {
                history, config, ..
            } => {
                assert_eq!(history, PathBuf::from("h.json"));
                assert_eq!(config, PathBuf::from("command-chain.toml"));
            }
            Command::RenderSystem { .. } => panic!("expected replay"),
        }
    }

    #[test]
    fn parse_render_system() {
        let cli = Cli::parse_from(["command-chain", "render-system", "--system", "Be brief."]);
        assert!(matches!(
            cli.command,
            Command::RenderSystem { ref system, .. } if system == "Be brief."
        ));
    }

    #[test]
    fn registry_uses_configured_reply_name() {
        let cfg = ChainConfig {
            reply_command: "answer".to_string(),
            ..ChainConfig::default()
        };
        let registry = build_registry(&cfg).expect("registry");
        assert!(registry.contains("answer"));
        assert!(registry.contains("echo"));
        assert!(!registry.contains("reply"));
    }

    #[test]
    fn printer_writes_errors_and_replies() {
        let mut printer = Printer { out: Vec::new() };
        printer.on_error("Error 1", "bad");
        {
            let mut sink = printer.result_callback();
            sink.on_start();
            sink.on_result("Hi");
            sink.on_end();
        }
        let text = String::from_utf8(printer.out).expect("utf8");
        assert_eq!(text, "[error] Error 1: bad\n[reply] Hi\n");
    }
}
