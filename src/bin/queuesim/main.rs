use queuesim::utils;
use queuesim::utils::prelude::*;

mod cli;
mod commands;

fn main() -> Result<()> {
    // panic setup should be done early
    utils::panic::setup();
    // logs go to stdout until the config says otherwise
    let mut logging = utils::logging::setup()?;

    // built-in defaults and environment, file and preset come from the cli
    utils::app_config::setup()?;

    trace!("Start cli execution");

    cli::execute(&mut logging)
}
