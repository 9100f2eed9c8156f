use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::engine::EngineConfig;
use crate::engine::capture::DEFAULT_SETTLE_DELAY;
use crate::engine::prompt::{Instruction, Preset};

#[derive(Parser)]
#[command(name = "rewrited", about = "Rewrite the selected text in place with an AI backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the daemon: each press of the shortcut rewrites the selection
    Run {
        /// Global shortcut, e.g. ctrl+space or <ctrl>+<alt>+r
        #[arg(long, env = "REWRITED_SHORTCUT", default_value = "ctrl+space")]
        shortcut: String,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Rewrite the current selection once and exit when done
    Once {
        #[command(flatten)]
        request: RequestArgs,
    },

    /// Print the current selection
    Capture {
        /// Wait after the synthetic copy, in milliseconds
        #[arg(long, env = "REWRITED_SETTLE_MS", default_value_t = default_settle_ms())]
        settle_ms: u64,
    },
}

#[derive(Args)]
pub struct RequestArgs {
    /// Writing option applied to the selection
    #[arg(long, env = "REWRITED_OPTION", value_enum, default_value_t = Preset::Proofread)]
    pub option: Preset,

    /// Free-form change to apply instead of --option
    #[arg(long, env = "REWRITED_CUSTOM")]
    pub custom: Option<String>,

    /// Wait after each synthetic copy/paste, in milliseconds
    #[arg(long, env = "REWRITED_SETTLE_MS", default_value_t = default_settle_ms())]
    pub settle_ms: u64,

    /// Do not raise desktop notifications for errors
    #[arg(long, env = "REWRITED_NO_NOTIFY")]
    pub no_notify: bool,

    /// Backend command; reads the prompt on stdin and streams the answer on stdout
    #[arg(trailing_var_arg = true, required = true)]
    pub provider: Vec<String>,
}

impl RequestArgs {
    pub fn engine_config(&self) -> EngineConfig {
        let instruction = match &self.custom {
            Some(change) => Instruction::Custom(change.clone()),
            None => Instruction::Preset(self.option),
        };
        EngineConfig {
            instruction,
            settle: Duration::from_millis(self.settle_ms),
        }
    }
}

fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE_DELAY.as_millis() as u64
}
