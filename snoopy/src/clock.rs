use std::time::{SystemTime, UNIX_EPOCH};

/// Maps producer timestamps (CLOCK_MONOTONIC ns since boot) onto wall-clock
/// ns since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootClock {
    offset_ns: i64,
}

impl BootClock {
    /// Leaves timestamps untouched.
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn from_offset(offset_ns: i64) -> Self {
        Self { offset_ns }
    }

    /// Measure `wall_now - monotonic_now` once at startup.
    pub fn detect() -> Self {
        let wall_now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i128)
            .unwrap_or_default();
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        }
        let mono_now_ns = (ts.tv_sec as i128) * 1_000_000_000 + (ts.tv_nsec as i128);
        Self {
            offset_ns: (wall_now_ns - mono_now_ns) as i64,
        }
    }

    pub fn offset_ns(&self) -> i64 {
        self.offset_ns
    }

    pub fn to_wall(&self, monotonic_ns: u64) -> u64 {
        monotonic_ns.saturating_add_signed(self.offset_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_keeps_timestamps() {
        assert_eq!(BootClock::identity().to_wall(12345), 12345);
    }

    #[test]
    fn offset_is_applied_and_saturates() {
        assert_eq!(BootClock::from_offset(1_000).to_wall(5), 1_005);
        assert_eq!(BootClock::from_offset(-10).to_wall(5), 0);
    }

    #[test]
    fn detected_offset_lands_near_now() {
        let clock = BootClock::detect();
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        }
        let mono = ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64;
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64;
        let rebased = clock.to_wall(mono);
        assert!(rebased.abs_diff(wall) < 5_000_000_000);
    }
}
