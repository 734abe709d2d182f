use structopt::StructOpt;

use queuesim::utils::prelude::*;
use queuesim::SimConfig;

/// Should be implemented by individual subcommand
pub trait Cmd {
    fn run(self) -> Result<()>;
}

/// Print the resolved simulation config as YAML
#[derive(StructOpt, Debug)]
pub struct Config {}

impl Cmd for Config {
    fn run(self) -> Result<()> {
        let cfg: SimConfig = config().fetch()?;
        print!("{}", serde_yaml::to_string(&cfg)?);

        Ok(())
    }
}

/// Print the preset names, one per line
#[derive(StructOpt, Debug)]
pub struct Presets {}

impl Cmd for Presets {
    fn run(self) -> Result<()> {
        for name in config().presets() {
            println!("{}", name);
        }

        Ok(())
    }
}

/// Run simulation end-to-end
#[derive(StructOpt, Debug)]
pub struct Run {}

impl Cmd for Run {
    fn run(self) -> Result<()> {
        queuesim::run_sim()
    }
}
