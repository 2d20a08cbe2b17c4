//! Keep-alive bookkeeping, driven by a cyclic one-second tick. One counter
//! tracks seconds since the last outbound packet (PINGREQ trigger); a
//! second server watchdog tracks seconds since the last inbound byte and
//! force-closes the connection when the timeout window passes with the
//! broker silent.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// PINGREQ fires when idle time reaches this percentage of keep-alive.
    pub ping_percent: u8,
    /// Watchdog trips when inbound silence reaches this percentage.
    pub timeout_percent: u8,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_percent: 100,
            timeout_percent: 150,
        }
    }
}

impl KeepaliveConfig {
    #[must_use]
    pub const fn new(ping_percent: u8, timeout_percent: u8) -> Self {
        Self {
            ping_percent,
            timeout_percent,
        }
    }

    #[must_use]
    pub fn ping_secs(&self, keep_alive_secs: u16) -> u32 {
        u32::from(keep_alive_secs) * u32::from(self.ping_percent) / 100
    }

    /// Rounded up, so the watchdog window is never shorter than the ping
    /// interval for small keep-alive values.
    #[must_use]
    pub fn timeout_secs(&self, keep_alive_secs: u16) -> u32 {
        (u32::from(keep_alive_secs) * u32::from(self.timeout_percent)).div_ceil(100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveEvent {
    None,
    SendPing,
    Timeout,
}

#[derive(Debug)]
pub struct KeepaliveTracker {
    keep_alive_secs: u16,
    config: KeepaliveConfig,
    /// Seconds since the last outbound packet.
    idle_ticks: u32,
    /// Seconds since the last inbound byte.
    watchdog_ticks: u32,
}

impl KeepaliveTracker {
    #[must_use]
    pub fn new(keep_alive_secs: u16) -> Self {
        Self::with_config(keep_alive_secs, KeepaliveConfig::default())
    }

    #[must_use]
    pub fn with_config(keep_alive_secs: u16, config: KeepaliveConfig) -> Self {
        Self {
            keep_alive_secs,
            config,
            idle_ticks: 0,
            watchdog_ticks: 0,
        }
    }

    /// The broker may override keep-alive at CONNACK time.
    pub fn set_keep_alive(&mut self, keep_alive_secs: u16) {
        self.keep_alive_secs = keep_alive_secs;
        self.reset();
    }

    #[must_use]
    pub fn keep_alive_secs(&self) -> u16 {
        self.keep_alive_secs
    }

    /// Advances the cyclic timer by one second. A zero keep-alive disables
    /// the mechanism entirely.
    pub fn on_tick(&mut self) -> KeepaliveEvent {
        if self.keep_alive_secs == 0 {
            return KeepaliveEvent::None;
        }

        self.idle_ticks += 1;
        self.watchdog_ticks += 1;

        if self.watchdog_ticks >= self.config.timeout_secs(self.keep_alive_secs) {
            return KeepaliveEvent::Timeout;
        }

        if self.idle_ticks >= self.config.ping_secs(self.keep_alive_secs) {
            self.idle_ticks = 0;
            return KeepaliveEvent::SendPing;
        }

        KeepaliveEvent::None
    }

    /// Any outbound packet postpones the next PINGREQ.
    pub fn record_outbound(&mut self) {
        self.idle_ticks = 0;
    }

    /// Any inbound traffic feeds the watchdog, PINGRESP or otherwise.
    pub fn record_inbound(&mut self) {
        self.watchdog_ticks = 0;
    }

    pub fn reset(&mut self) {
        self.idle_ticks = 0;
        self.watchdog_ticks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_after_keep_alive_idle() {
        let mut tracker = KeepaliveTracker::new(3);
        assert_eq!(tracker.on_tick(), KeepaliveEvent::None);
        assert_eq!(tracker.on_tick(), KeepaliveEvent::None);
        assert_eq!(tracker.on_tick(), KeepaliveEvent::SendPing);
    }

    #[test]
    fn test_outbound_traffic_postpones_ping() {
        let mut tracker = KeepaliveTracker::new(2);
        assert_eq!(tracker.on_tick(), KeepaliveEvent::None);
        tracker.record_outbound();
        assert_eq!(tracker.on_tick(), KeepaliveEvent::None);
        tracker.record_inbound();
        assert_eq!(tracker.on_tick(), KeepaliveEvent::SendPing);
    }

    #[test]
    fn test_watchdog_trips_without_inbound() {
        let mut tracker = KeepaliveTracker::new(2);
        // timeout at 150% of 2s = 3 ticks; pings fire along the way
        assert_eq!(tracker.on_tick(), KeepaliveEvent::None);
        assert_eq!(tracker.on_tick(), KeepaliveEvent::SendPing);
        assert_eq!(tracker.on_tick(), KeepaliveEvent::Timeout);
    }

    #[test]
    fn test_inbound_resets_watchdog() {
        let mut tracker = KeepaliveTracker::new(2);
        for _ in 0..2 {
            let _ = tracker.on_tick();
        }
        tracker.record_inbound();
        assert_ne!(tracker.on_tick(), KeepaliveEvent::Timeout);
    }

    #[test]
    fn test_zero_keep_alive_disables() {
        let mut tracker = KeepaliveTracker::new(0);
        for _ in 0..1000 {
            assert_eq!(tracker.on_tick(), KeepaliveEvent::None);
        }
    }

    #[test]
    fn test_server_keep_alive_override() {
        let mut tracker = KeepaliveTracker::new(60);
        tracker.set_keep_alive(1);
        assert_eq!(tracker.keep_alive_secs(), 1);
        assert_eq!(tracker.on_tick(), KeepaliveEvent::SendPing);
    }
}
