use log::LevelFilter;

pub const DEFAULT_REGION: &str = "us-east-2";
pub const DEFAULT_AGENT_LEVEL_FILTER: LevelFilter = LevelFilter::Info;
pub const DEFAULT_ASSUME_ROLE_SESSION_DURATION: i32 = 3600;
