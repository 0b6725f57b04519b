use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// a point in time as seconds plus a fraction of a second in nanoseconds,
/// counted from [UNIX_EPOCH]
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeSpec {
    /// seconds
    pub sec: u64,
    /// fraction of a second in nanoseconds
    pub nsec: u32,
}

impl TimeSpec {
    pub const fn new(sec: u64, nsec: u32) -> Self {
        TimeSpec { sec, nsec }
    }
}

/// what time is it since `1970-1-1 00:00:00`
pub fn now() -> TimeSpec {
    // a clock set before 1970 is reported as the epoch itself
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    TimeSpec {
        sec: now.as_secs(),
        nsec: now.subsec_nanos(),
    }
}

impl From<TimeSpec> for SystemTime {
    fn from(value: TimeSpec) -> Self {
        UNIX_EPOCH + Duration::new(value.sec, value.nsec)
    }
}

impl TryFrom<SystemTime> for TimeSpec {
    type Error = anyhow::Error;
    fn try_from(value: SystemTime) -> Result<Self, Self::Error> {
        match value.duration_since(UNIX_EPOCH) {
            Ok(duration) => Ok(TimeSpec {
                sec: duration.as_secs(),
                nsec: duration.subsec_nanos(),
            }),
            Err(before_epoch_error) => Err(anyhow!(
                "doesn't support time before UNIX_EPOCH: {}",
                before_epoch_error
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_conversion() -> anyhow::Result<()> {
        let time = TimeSpec::new(1_600_000_000, 42);
        let system_time: SystemTime = time.into();
        assert_eq!(TimeSpec::try_from(system_time)?, time);
        Ok(())
    }

    #[test]
    fn test_time_before_epoch_is_rejected() {
        let before = UNIX_EPOCH - Duration::from_secs(1);
        assert!(TimeSpec::try_from(before).is_err());
    }
}
