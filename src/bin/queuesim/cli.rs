use std::path::PathBuf;

use structopt::clap::AppSettings;
use structopt::StructOpt;

use queuesim::utils::logging::GlobalLoggingContext;
use queuesim::utils::prelude::*;

use crate::commands::{self, Cmd};

#[derive(StructOpt, Debug)]
#[structopt(global_settings = &[AppSettings::VersionlessSubcommands, AppSettings::ColoredHelp])]
struct Cli {
    /// Set a custom config file
    #[structopt(short, long, parse(from_os_str), value_name = "FILE")]
    config: Option<PathBuf>,

    /// Apply a named preset on top of the config
    #[structopt(short, long, value_name = "NAME")]
    preset: Option<String>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
    /// Show the simulation config after all overrides
    Config(commands::Config),
    /// List the known presets
    Presets(commands::Presets),
    /// Run the simulation and write the output tables
    Run(commands::Run),
}

impl Command {
    /// Whether the command prints its result to stdout
    fn produces_output(&self) -> bool {
        !matches!(self, Command::Run(_))
    }
}

pub fn execute(logging: &mut GlobalLoggingContext) -> Result<()> {
    let cli = Cli::from_args();

    {
        let mut config = config_mut();
        if let Some(path) = &cli.config {
            config.use_file(path)?;
        }
        if let Some(name) = &cli.preset {
            config.use_preset(name)?;
        }
    }
    logging.reconfigure(cli.cmd.produces_output())?;
    debug!(config = ?cli.config, preset = ?cli.preset, "config loaded");

    match cli.cmd {
        Command::Config(cmd) => cmd.run(),
        Command::Presets(cmd) => cmd.run(),
        Command::Run(cmd) => cmd.run(),
    }
}
