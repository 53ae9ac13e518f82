use anyhow::{Context, Result};

use recupoll::poller::Poller;

use crate::argsets::DeviceArgs;

/// Perform one sweep and print the resulting snapshot as JSON.
pub fn sweep(args: DeviceArgs) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let poller = Poller::new(args.config);
        let snapshot = poller.sweep_now().await.context("Sweep failed")?;
        println!("{}", serde_json::to_string_pretty(&*snapshot)?);
        Ok(())
    })
}
