use anyhow::{anyhow, Result};

use recupoll::poller::Poller;

use crate::argsets::WriteArgs;

/// Write a single holding register and exit.
pub fn write(args: WriteArgs) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let poller = Poller::new(args.device.config);
        if poller.write_register(args.address, args.value).await {
            println!("Wrote {} to register {}", args.value, args.address);
            Ok(())
        } else {
            Err(anyhow!("Write to register {} failed", args.address))
        }
    })
}
