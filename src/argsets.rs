use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use pico_args::Arguments;

use recupoll::constants::envvars;
use recupoll::poller::PollerConfig;

/// Connection settings shared by every subcommand. Flags override the
/// RECUPOLL_* environment, which overrides the device factory defaults.
pub struct DeviceArgs {
    pub config: PollerConfig,
}

impl DeviceArgs {
    pub fn from_args(args: &mut Arguments) -> Result<Self> {
        let host: String = match args.opt_value_from_str("--host")? {
            Some(host) => host,
            None => env::var(envvars::HOST)
                .map_err(|_| anyhow!("Device host required: pass --host or set {}", envvars::HOST))?,
        };

        let mut config = PollerConfig::new(host);
        if let Some(port) = flag_or_env(args, "--port", envvars::PORT)? {
            config.port = port;
        }
        if let Some(unit_id) = flag_or_env(args, "--unit", envvars::UNIT_ID)? {
            config.unit_id = unit_id;
        }
        if let Some(secs) = flag_or_env::<u64>(args, "--interval", envvars::POLL_INTERVAL)? {
            config.poll_interval = Duration::from_secs(secs);
        }

        Ok(DeviceArgs { config })
    }
}

pub struct WriteArgs {
    pub device: DeviceArgs,
    pub address: u16,
    pub value: u16,
}

impl WriteArgs {
    pub fn from_args(args: &mut Arguments) -> Result<Self> {
        Ok(WriteArgs {
            device: DeviceArgs::from_args(args)?,
            address: args.free_from_str()?,
            value: args.free_from_str()?,
        })
    }
}

fn flag_or_env<T>(args: &mut Arguments, flag: &'static str, var: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    if let Some(value) = args.opt_value_from_str(flag)? {
        return Ok(Some(value));
    }
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("Invalid {var}: {e}")),
        Err(_) => Ok(None),
    }
}
