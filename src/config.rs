use std::time::Duration;

/// Where the notification service lives and how to talk to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub base_url: String,
    pub streams_route: String,
    pub search_route: String,
    pub subscribe_route: String,
    pub csrf_token: String,
    pub session_id: Option<String>,
    pub reveal_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: String::from("http://127.0.0.1:8000"),
            streams_route: String::from("/notifpy/twitch-api"),
            search_route: String::from("/notifpy/find-channel"),
            subscribe_route: String::from("/notifpy/create-channel"),
            csrf_token: String::new(),
            session_id: None,
            reveal_delay: Duration::from_millis(100),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut this = Self::default();

        let set = |key: &str, field: &mut String| {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *field = value.trim().to_string();
            }
        };

        set("NOTIFPY_URL", &mut this.base_url);
        set("NOTIFPY_STREAMS_ROUTE", &mut this.streams_route);
        set("NOTIFPY_SEARCH_ROUTE", &mut this.search_route);
        set("NOTIFPY_SUBSCRIBE_ROUTE", &mut this.subscribe_route);
        set("NOTIFPY_CSRF_TOKEN", &mut this.csrf_token);

        this.session_id = lookup("NOTIFPY_SESSION_ID").filter(|v| !v.trim().is_empty());

        if let Some(delay) = lookup("NOTIFPY_REVEAL_DELAY_MS") {
            let ms = delay.trim().parse::<u64>().map_err(|err| {
                anyhow::anyhow!("NOTIFPY_REVEAL_DELAY_MS must be milliseconds, got '{delay}': {err}")
            })?;
            this.reveal_delay = Duration::from_millis(ms);
        }

        this.base_url = this.base_url.trim_end_matches('/').to_string();
        Ok(this)
    }

    pub fn url(&self, route: &str) -> String {
        if route.starts_with("http://") || route.starts_with("https://") {
            return route.to_string();
        }
        format!("{}/{}", self.base_url, route.trim_start_matches('/'))
    }
}
