//! Serde helpers for configuration values

/// Duration stored as a number of seconds.
///
/// Whole seconds are written as integers; sub-second values as floats, so
/// `connect_settle = 5` and `drain_timeout = 0.5` are both accepted.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     #[serde(with = "gw_core::config::serde_utils::duration_secs")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Secs {
        Whole(u64),
        Fractional(f64),
    }

    /// Serialize a Duration as seconds
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_f64(duration.as_secs_f64())
        }
    }

    /// Deserialize a Duration from integer or fractional seconds
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Secs::deserialize(deserializer)? {
            Secs::Whole(secs) => Ok(Duration::from_secs(secs)),
            Secs::Fractional(secs) => Duration::try_from_secs_f64(secs)
                .map_err(|e| serde::de::Error::custom(format!("invalid duration {}: {}", secs, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TestConfig {
        #[serde(with = "duration_secs")]
        timeout: Duration,
    }

    #[test]
    fn test_whole_seconds_serialize_as_integer() {
        let config = TestConfig {
            timeout: Duration::from_secs(5),
        };
        assert_eq!(serde_json::to_string(&config).unwrap(), r#"{"timeout":5}"#);
    }

    #[test]
    fn test_fractional_seconds() {
        let config: TestConfig = serde_json::from_str(r#"{"timeout":0.25}"#).unwrap();
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(serde_json::to_string(&config).unwrap(), r#"{"timeout":0.25}"#);
    }

    #[test]
    fn test_negative_seconds_rejected() {
        assert!(serde_json::from_str::<TestConfig>(r#"{"timeout":-1.5}"#).is_err());
    }
}
