use std::time::Duration;

// Factory settings of the recuperator's Modbus TCP gateway.
pub const PORT: u16 = 8899;
pub const UNIT_ID: u8 = 10;

pub const POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const RECOVERY_INTERVAL: Duration = Duration::from_secs(300);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const FAILURE_THRESHOLD: u32 = 5;

pub const LOG_LEVEL: &str = "info";
