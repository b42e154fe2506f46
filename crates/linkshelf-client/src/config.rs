use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub realtime_url: String,
    /// Unread-count backstop while push events may have been missed.
    pub poll_interval: Duration,
    /// How long a freshly arrived share stays flagged.
    pub just_arrived_delay: Duration,
    pub profile_timeout: Duration,
}

impl ClientConfig {
    /// Derives the realtime endpoint from the HTTP base URL.
    pub fn new(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let realtime_url = if let Some(rest) = base_url.strip_prefix("https://") {
            format!("wss://{}/realtime", rest)
        } else if let Some(rest) = base_url.strip_prefix("http://") {
            format!("ws://{}/realtime", rest)
        } else {
            format!("{}/realtime", base_url)
        };

        Self {
            base_url,
            realtime_url,
            poll_interval: Duration::from_secs(10),
            just_arrived_delay: Duration::from_secs(3),
            profile_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_url_follows_scheme() {
        assert_eq!(
            ClientConfig::new("https://linkshelf.app/").realtime_url,
            "wss://linkshelf.app/realtime"
        );
        let local = ClientConfig::default();
        assert_eq!(local.realtime_url, "ws://localhost:3000/realtime");
        assert_eq!(local.poll_interval, Duration::from_secs(10));
    }
}
