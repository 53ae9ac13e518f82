use anyhow::Result;

use recupoll::poller::Poller;
use recupoll::registers;

use crate::argsets::DeviceArgs;

/// Run the poll loop until interrupted.
pub fn poll(args: DeviceArgs) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        log::info!(
            "Polling {}:{} (unit {}) every {:.0}s",
            args.config.host,
            args.config.port,
            args.config.unit_id,
            args.config.poll_interval.as_secs_f32()
        );
        log::debug!("Register map: {}", registers::describe());

        let mut poller = Poller::new(args.config);
        poller.start();

        tokio::signal::ctrl_c().await?;
        log::info!("Interrupted; shutting down");
        poller.stop().await;
        Ok(())
    })
}
