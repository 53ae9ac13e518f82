mod argsets;
mod command;

use anyhow::{anyhow, Result};
use env_logger::Env;

use recupoll::constants::{defaults, envvars};
use recupoll::helpers::load_dotenv;

const CMD_POLL: &str = "poll";
const CMD_SWEEP: &str = "sweep";
const CMD_WRITE: &str = "write";

fn main() -> Result<()> {
    load_dotenv();
    env_logger::Builder::from_env(Env::default().filter_or(envvars::LOG_LEVEL, defaults::LOG_LEVEL))
        .init();

    let mut args = pico_args::Arguments::from_env();
    match args.subcommand()?.as_deref() {
        Some(CMD_POLL) => command::poll(argsets::DeviceArgs::from_args(&mut args)?),
        Some(CMD_SWEEP) => command::sweep(argsets::DeviceArgs::from_args(&mut args)?),
        Some(CMD_WRITE) => command::write(argsets::WriteArgs::from_args(&mut args)?),
        _ => Err(anyhow!(
            "Subcommand must be one of 'poll', 'sweep', 'write'"
        )),
    }
}
