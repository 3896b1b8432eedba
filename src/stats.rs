use crate::util;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MonitorStatistics {
    pub offline_polls: u64,
    pub captures: u64,
    pub bytes_recorded: u64,
}

impl MonitorStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_capture(&mut self, bytes: u64) {
        self.captures += 1;
        self.bytes_recorded += bytes;
    }

    pub fn summary(&self) -> String {
        format!(
            "{} recording(s), {} total, {} offline poll(s)",
            self.captures,
            util::format_bytes(self.bytes_recorded),
            self.offline_polls
        )
    }
}
