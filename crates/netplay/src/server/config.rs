use std::time::Duration;

pub const DEFAULT_MAX_CLIENTS: usize = 4;
pub const DEFAULT_TICK_RATE: u32 = 30;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_clients: usize,
    pub tick_rate: u32,
    pub max_frames_per_tick: usize,
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate.max(1)))
    }

    pub fn listen_backlog(&self) -> i32 {
        i32::try_from(self.max_clients.saturating_mul(2)).unwrap_or(i32::MAX)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: DEFAULT_MAX_CLIENTS,
            tick_rate: DEFAULT_TICK_RATE,
            max_frames_per_tick: 256,
        }
    }
}
