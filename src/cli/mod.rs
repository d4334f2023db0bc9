pub mod call;
pub mod chat;
pub mod serve;
pub mod translate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::error::Result;

/// Edit 3D models through natural-language chat.
#[derive(Parser, Debug)]
#[command(name = "meshchat", version, about, long_about = None)]
pub struct Cli {
    /// Config file. Defaults to ~/.config/meshchat/config.yml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scene tool listener over an in-memory scene.
    ServeTool {
        /// Bind host (overrides listener.host).
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides listener.port).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Edit a task's model interactively. `/reset` starts over, `/quit` exits.
    Chat {
        /// Task whose `<task_id>.glb` is edited.
        #[arg(long)]
        task_id: String,
    },

    /// Translate one message and print the resulting command.
    Translate {
        message: String,
        /// Skip the language model and use keyword matching only.
        #[arg(long)]
        offline: bool,
    },

    /// Send a raw request to the scene tool.
    Call {
        method: String,
        /// Request params as a JSON object.
        #[arg(long)]
        params: Option<String>,
    },
}

impl Cli {
    /// Settings from `--config` or the global file, with env overrides.
    pub fn settings(&self) -> Result<Settings> {
        let settings = match &self.config {
            Some(path) => Settings::load_from(path)?,
            None => Settings::load_global()?,
        };
        Ok(settings.with_env_overrides())
    }
}
