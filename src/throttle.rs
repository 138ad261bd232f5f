//! Helpers to honor broker-side throttling within the Kafka protocol.

use std::time::Duration;

use tracing::{debug, warn};

/// Convert a `throttle_time_ms` response field into the time we should stay quiet.
///
/// Missing, zero or negative values mean "no throttle".
pub fn throttle_duration(throttle_time_ms: Option<i32>) -> Option<Duration> {
    let throttle_time_ms = throttle_time_ms.unwrap_or_default();
    let throttle_time_ms: u64 = match throttle_time_ms.try_into() {
        Ok(t) => t,
        Err(_) => {
            warn!(throttle_time_ms, "Invalid throttle time",);
            return None;
        }
    };

    (throttle_time_ms > 0).then(|| Duration::from_millis(throttle_time_ms))
}

/// Sleep for the throttle time the broker asked for, if any.
///
/// The response itself is still valid, a throttled broker only asks us to delay the next request.
pub async fn respect_throttle(throttle_time_ms: Option<i32>) {
    if let Some(duration) = throttle_duration(throttle_time_ms) {
        debug!(?duration, "Broker throttled request");
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_duration() {
        assert_eq!(throttle_duration(None), None);
        assert_eq!(throttle_duration(Some(0)), None);
        assert_eq!(throttle_duration(Some(-5)), None);
        assert_eq!(
            throttle_duration(Some(250)),
            Some(Duration::from_millis(250))
        );
    }

    #[tokio::test]
    async fn test_respect_throttle_without_throttle_returns() {
        respect_throttle(Some(0)).await;
        respect_throttle(None).await;
    }
}
