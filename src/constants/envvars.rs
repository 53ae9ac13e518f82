pub const HOST: &str = "RECUPOLL_HOST";
pub const PORT: &str = "RECUPOLL_PORT";
pub const UNIT_ID: &str = "RECUPOLL_UNIT_ID";
pub const POLL_INTERVAL: &str = "RECUPOLL_POLL_INTERVAL";

pub const LOG_LEVEL: &str = "RECUPOLL_LOG_LEVEL";
