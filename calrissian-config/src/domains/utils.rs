//! Durations in config files are whole seconds, like the CLI flags and the
//! `CALRISSIAN_*` overrides

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// `#[serde(with = "...::seconds")]` for a `Duration`
pub mod seconds {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Same as [`seconds`] for an `Option<Duration>`, `null` meaning unset
pub mod optional_seconds {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => seconds::serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timers {
        #[serde(with = "seconds")]
        interval: Duration,
        #[serde(with = "optional_seconds", default)]
        wall_time: Option<Duration>,
    }

    #[test]
    fn test_seconds_in_yaml() {
        let timers: Timers = serde_yaml::from_str("interval: 15\nwall_time: 3600\n").unwrap();
        assert_eq!(timers.interval, Duration::from_secs(15));
        assert_eq!(timers.wall_time, Some(Duration::from_secs(3600)));

        let unset: Timers = serde_yaml::from_str("interval: 5\n").unwrap();
        assert_eq!(unset.wall_time, None);

        assert!(serde_yaml::from_str::<Timers>("interval: 15s\n").is_err());
    }

    #[test]
    fn test_sub_second_precision_is_dropped() {
        let timers = Timers {
            interval: Duration::from_millis(2500),
            wall_time: None,
        };
        let yaml = serde_yaml::to_string(&timers).unwrap();
        assert!(yaml.contains("interval: 2"));
        assert!(yaml.contains("wall_time: null"));
    }
}
