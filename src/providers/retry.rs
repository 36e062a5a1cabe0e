use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub(crate) const BUSY_MAX_RETRIES: usize = 5;
pub(crate) const BUSY_BASE_DELAY: Duration = Duration::from_secs(2);
pub(crate) const BUSY_MAX_DELAY: Duration = Duration::from_secs(60);

/// Local model servers answer 503 while a model is still loading; treat it like a rate limit.
pub(crate) fn is_busy(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("server busy")
        || lower.contains("overloaded")
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<u64>().ok().map(Duration::from_secs)
}

/// The pause before the next attempt: the backoff delay, or longer when the
/// server asked for it.
pub(crate) fn planned_wait(delay: Duration, retry_after: Option<Duration>) -> Duration {
    match retry_after {
        Some(retry_after) if retry_after > delay => retry_after,
        _ => delay,
    }
}

/// Another attempt is allowed while under the attempt cap and while the pause
/// still ends inside the request budget.
pub(crate) fn retry_allowed(
    attempt: usize,
    elapsed: Duration,
    wait: Duration,
    budget: Duration,
) -> bool {
    attempt < BUSY_MAX_RETRIES && elapsed.saturating_add(wait) < budget
}

pub(crate) async fn wait_with_backoff(
    endpoint: &str,
    attempt: usize,
    wait: Duration,
    delay: Duration,
) -> Duration {
    warn!(
        "{} is busy; retrying in {:.1}s (attempt {}/{})",
        endpoint,
        wait.as_secs_f32(),
        attempt,
        BUSY_MAX_RETRIES
    );
    sleep(wait).await;
    next_delay(delay)
}

pub(crate) fn next_delay(current: Duration) -> Duration {
    let next_secs = current
        .as_secs()
        .saturating_mul(2)
        .max(BUSY_BASE_DELAY.as_secs());
    Duration::from_secs(next_secs).min(BUSY_MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn delay_doubles_and_caps() {
        assert_eq!(next_delay(Duration::from_secs(0)), BUSY_BASE_DELAY);
        assert_eq!(next_delay(Duration::from_secs(2)), Duration::from_secs(4));
        assert_eq!(next_delay(Duration::from_secs(45)), BUSY_MAX_DELAY);
    }

    #[test]
    fn busy_detection_covers_status_and_body() {
        assert!(is_busy(StatusCode::SERVICE_UNAVAILABLE, ""));
        assert!(is_busy(StatusCode::BAD_REQUEST, "Server busy, please try again"));
        assert!(!is_busy(StatusCode::NOT_FOUND, "model not found"));
    }

    #[test]
    fn server_hint_only_lengthens_the_wait() {
        let delay = Duration::from_secs(4);
        assert_eq!(planned_wait(delay, None), delay);
        assert_eq!(planned_wait(delay, Some(Duration::from_secs(1))), delay);
        assert_eq!(
            planned_wait(delay, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn retries_stop_at_the_cap_or_the_request_budget() {
        let budget = Duration::from_secs(180);
        let wait = Duration::from_secs(8);
        assert!(retry_allowed(1, Duration::from_secs(10), wait, budget));
        assert!(!retry_allowed(BUSY_MAX_RETRIES, Duration::from_secs(10), wait, budget));
        assert!(!retry_allowed(2, Duration::from_secs(175), wait, budget));
        assert!(!retry_allowed(1, Duration::ZERO, Duration::from_secs(240), budget));
    }

    #[test]
    fn retry_after_reads_seconds_only() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert("retry-after", HeaderValue::from_static("Wed, 21 Oct 2015"));
        assert_eq!(retry_after(&headers), None);
    }
}
