use ::serde::{Deserialize, Deserializer, Serialize};
use anyhow::Context as _;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    RequestBuilder, StatusCode,
};
use serde_json::Value;

use crate::Config;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub game: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub thumb: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub screen: String,
    #[serde(default, alias = "link", deserialize_with = "lenient::string")]
    pub lnk: String,
    #[serde(default, deserialize_with = "lenient::count")]
    pub viewer_count: Option<u64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub started_at: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelCandidate {
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub thumbnail: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
}

/// Decodes one array item on its own, so a bad item only blanks itself.
pub trait FromItem: Default + for<'de> Deserialize<'de> {
    fn from_item(item: Value) -> Self {
        // derived structs also accept sequences, filling fields by position
        if !item.is_object() {
            log::warn!(
                "{} entry is not an object, rendering it blank",
                std::any::type_name::<Self>()
            );
            return Self::default();
        }

        serde_json::from_value(item).unwrap_or_else(|err| {
            log::warn!(
                "malformed {} entry, rendering it blank: {err}",
                std::any::type_name::<Self>()
            );
            Self::default()
        })
    }
}

impl FromItem for StreamEntry {}
impl FromItem for ChannelCandidate {}

mod lenient {
    use super::*;

    pub fn string<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => String::new(),
        })
    }

    pub fn count<'de, D: Deserializer<'de>>(de: D) -> Result<Option<u64>, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Priority {
    None,
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Self; 4] = [Self::None, Self::Low, Self::Medium, Self::High];

    pub const fn value(self) -> i8 {
        match self {
            Self::None => -1,
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
    config: Config,
}

impl Client {
    pub fn create(config: Config) -> anyhow::Result<Self> {
        let mut headers = [("user-agent", USER_AGENT.to_string())]
            .into_iter()
            .chain(Self::cookie(&config).map(|cookie| ("cookie", cookie)))
            .map(|(k, v)| Ok((HeaderName::from_static(k), HeaderValue::from_str(&v)?)))
            .collect::<anyhow::Result<HeaderMap>>()?;

        if let Some(cookie) = headers.get_mut("cookie") {
            cookie.set_sensitive(true);
        }

        let client = reqwest::ClientBuilder::new()
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn get_streams(&self) -> anyhow::Result<Vec<StreamEntry>> {
        let url = self.config.url(&self.config.streams_route);
        log::debug!("fetching streams: {url}");
        self.get_items(self.client.get(&url)).await
    }

    pub async fn find_channel(&self, query: &str) -> anyhow::Result<Vec<ChannelCandidate>> {
        let query = query.trim();
        anyhow::ensure!(!query.is_empty(), "search query was empty");

        let url = self.config.url(&self.config.search_route);
        log::debug!("searching channels for '{query}': {url}");

        let req = self
            .client
            .post(&url)
            .header("x-csrftoken", &self.config.csrf_token)
            .body(query.to_string());

        self.get_items(req).await
    }

    pub async fn subscribe(
        &self,
        candidate: &ChannelCandidate,
        priority: Priority,
    ) -> anyhow::Result<()> {
        #[derive(Serialize)]
        struct Form<'a> {
            csrfmiddlewaretoken: &'a str,
            id: &'a str,
            title: &'a str,
            thumbnail: &'a str,
            priority: i8,
        }

        let url = self.config.url(&self.config.subscribe_route);
        log::debug!("subscribing to '{}': {url}", candidate.id);

        let resp = self
            .client
            .post(&url)
            .header("x-csrftoken", &self.config.csrf_token)
            .form(&Form {
                csrfmiddlewaretoken: &self.config.csrf_token,
                id: &candidate.id,
                title: &candidate.title,
                thumbnail: &candidate.thumbnail,
                priority: priority.value(),
            })
            .send()
            .await
            .with_context(|| anyhow::anyhow!("cannot reach {url}"))?;

        let status = resp.status();
        anyhow::ensure!(
            status.is_success() || status.is_redirection(),
            "subscribing to '{}' failed: {status}",
            candidate.title
        );
        Ok(())
    }

    async fn get_items<T: FromItem>(&self, req: RequestBuilder) -> anyhow::Result<Vec<T>> {
        let resp = req.send().await?;

        let status = resp.status();
        let url = resp.url().clone();
        anyhow::ensure!(status == StatusCode::OK, "{url} responded with {status}");

        let items: Vec<Value> = resp
            .json()
            .await
            .with_context(|| anyhow::anyhow!("{url} did not return a json array"))?;

        Ok(items.into_iter().map(T::from_item).collect())
    }

    fn cookie(config: &Config) -> Option<String> {
        let token = Some(&config.csrf_token)
            .filter(|t| !t.is_empty())
            .map(|t| format!("csrftoken={t}"));
        let session = config.session_id.as_ref().map(|s| format!("sessionid={s}"));

        match (token, session) {
            (Some(token), Some(session)) => Some(format!("{token}; {session}")),
            (token, session) => token.or(session),
        }
    }
}

pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server, ServerGuard};

    use super::*;

    fn client_for(server: &ServerGuard, token: &str) -> Client {
        Client::create(Config {
            base_url: server.url(),
            csrf_token: token.to_string(),
            ..Config::default()
        })
        .unwrap()
    }

    #[test]
    fn stream_entry_accepts_the_old_link_key() {
        let entry = StreamEntry::from_item(serde_json::json!({
            "name": "alice",
            "link": "https://twitch.tv/alice",
            "viewer_count": "42",
        }));
        assert_eq!(entry.lnk, "https://twitch.tv/alice");
        assert_eq!(entry.viewer_count, Some(42));
        assert_eq!(entry.title, "");
    }

    #[test]
    fn malformed_items_render_blank() {
        assert_eq!(
            StreamEntry::from_item(serde_json::json!("not an object")),
            StreamEntry::default()
        );

        let candidate = ChannelCandidate::from_item(serde_json::json!({
            "title": null,
            "thumbnail": 12,
            "id": "UC123",
        }));
        assert_eq!(candidate.title, "");
        assert_eq!(candidate.thumbnail, "12");
        assert_eq!(candidate.id, "UC123");
    }

    #[test]
    fn array_shaped_items_render_blank() {
        let positional = serde_json::json!([
            "alice", "speedruns", "Celeste", "a.png", "a.jpg", "https://twitch.tv/alice", 5,
            "2022-11-20T10:00:00Z"
        ]);
        assert_eq!(StreamEntry::from_item(positional), StreamEntry::default());
        assert_eq!(
            StreamEntry::from_item(serde_json::json!(["garbage"])),
            StreamEntry::default()
        );
        assert_eq!(
            ChannelCandidate::from_item(serde_json::json!(["Some Channel", "t.jpg", "UCabc"])),
            ChannelCandidate::default()
        );
    }

    #[tokio::test]
    async fn get_streams_decodes_each_entry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/notifpy/twitch-api")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    {"name": "alice", "title": "speedruns", "game": "Celeste", "thumb": "a.png",
                     "screen": "a.jpg", "lnk": "https://twitch.tv/alice", "viewer_count": 12,
                     "started_at": "2022-11-20T10:00:00Z"},
                    42,
                    {"name": "bob"}
                ]"#,
            )
            .create_async()
            .await;

        let streams = client_for(&server, "").get_streams().await.unwrap();
        mock.assert_async().await;

        assert_eq!(streams.len(), 3);
        assert_eq!(streams[0].game, "Celeste");
        assert_eq!(streams[0].viewer_count, Some(12));
        assert_eq!(streams[1], StreamEntry::default());
        assert_eq!(streams[2].name, "bob");
    }

    #[tokio::test]
    async fn get_streams_rejects_non_200() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/notifpy/twitch-api")
            .with_status(204)
            .create_async()
            .await;

        assert!(client_for(&server, "").get_streams().await.is_err());
    }

    #[tokio::test]
    async fn get_streams_rejects_malformed_json() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/notifpy/twitch-api")
            .with_status(200)
            .with_body("{\"oops\": true}")
            .create_async()
            .await;

        assert!(client_for(&server, "").get_streams().await.is_err());
    }

    #[tokio::test]
    async fn find_channel_posts_trimmed_query_with_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/notifpy/find-channel")
            .match_header("x-csrftoken", "secret")
            .match_body(Matcher::Exact("some channel".into()))
            .with_status(200)
            .with_body(r#"[{"thumbnail": "t.jpg", "title": "Some Channel", "id": "UCabc"}]"#)
            .create_async()
            .await;

        let found = client_for(&server, "secret")
            .find_channel("  some channel \n")
            .await
            .unwrap();
        mock.assert_async().await;

        assert_eq!(
            found,
            vec![ChannelCandidate {
                title: "Some Channel".into(),
                thumbnail: "t.jpg".into(),
                id: "UCabc".into(),
            }]
        );
    }

    #[tokio::test]
    async fn find_channel_refuses_blank_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/notifpy/find-channel")
            .expect(0)
            .create_async()
            .await;

        assert!(client_for(&server, "").find_channel("   ").await.is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn subscribe_posts_the_hidden_fields() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/notifpy/create-channel")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("csrfmiddlewaretoken".into(), "secret".into()),
                Matcher::UrlEncoded("id".into(), "UCabc".into()),
                Matcher::UrlEncoded("title".into(), "Some Channel".into()),
                Matcher::UrlEncoded("thumbnail".into(), "t.jpg".into()),
                Matcher::UrlEncoded("priority".into(), "2".into()),
            ]))
            .with_status(302)
            .with_header("location", "/notifpy/channel/some-channel")
            .create_async()
            .await;

        let candidate = ChannelCandidate {
            title: "Some Channel".into(),
            thumbnail: "t.jpg".into(),
            id: "UCabc".into(),
        };

        client_for(&server, "secret")
            .subscribe(&candidate, Priority::High)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn cookie_combines_token_and_session() {
        let mut config = Config::default();
        assert_eq!(Client::cookie(&config), None);

        config.csrf_token = "tok".into();
        assert_eq!(Client::cookie(&config).as_deref(), Some("csrftoken=tok"));

        config.session_id = Some("sess".into());
        assert_eq!(
            Client::cookie(&config).as_deref(),
            Some("csrftoken=tok; sessionid=sess")
        );
    }
}
