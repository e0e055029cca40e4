use egui::{vec2, ComboBox, Grid, RichText, TextEdit};
use egui_notify::Toasts;
use tokio::sync::oneshot::{error::TryRecvError, Receiver};

use crate::{
    api::{self, ChannelCandidate, Priority},
    image as img, thumbnail,
};

#[derive(Clone, Debug, PartialEq)]
pub struct CandidateRow {
    pub image_src: String,
    pub label: String,
    candidate: ChannelCandidate,
}

impl CandidateRow {
    pub fn new(candidate: ChannelCandidate) -> Self {
        Self {
            image_src: candidate.thumbnail.clone(),
            label: candidate.title.clone(),
            candidate,
        }
    }

    /// The hidden fields carried along for a later subscription.
    pub fn form_fields(&self) -> [(&'static str, &str); 3] {
        [
            ("title", self.candidate.title.as_str()),
            ("thumbnail", self.candidate.thumbnail.as_str()),
            ("id", self.candidate.id.as_str()),
        ]
    }

    pub fn candidate(&self) -> &ChannelCandidate {
        &self.candidate
    }
}

#[derive(Default)]
pub struct Search {
    pub input: String,
    pub priority: Priority,
    rows: Option<Vec<CandidateRow>>,
    searching: Option<(String, Receiver<anyhow::Result<Vec<ChannelCandidate>>>)>,
    subscribing: Vec<(String, Receiver<anyhow::Result<()>>)>,
}

impl Search {
    pub fn rows(&self) -> &[CandidateRow] {
        self.rows.as_deref().unwrap_or_default()
    }

    pub fn is_searching(&self) -> bool {
        self.searching.is_some()
    }

    /// Takes the trimmed query out of the input, if there is one.
    fn take_query(&mut self) -> Option<String> {
        let query = self.input.trim();
        if query.is_empty() {
            return None;
        }

        let query = query.to_string();
        self.input.clear();
        Some(query)
    }

    /// Returns whether a request was issued.
    pub fn submit(&mut self, client: &api::Client) -> bool {
        let Some(query) = self.take_query() else { return false };

        let client = client.clone();
        let task = crate::runtime::spawn({
            let query = query.clone();
            async move { client.find_channel(&query).await }
        });
        self.searching.replace((query, task));
        true
    }

    pub fn subscribe(&mut self, client: &api::Client, row: &CandidateRow) {
        let client = client.clone();
        let candidate = row.candidate().clone();
        let priority = self.priority;

        let task = crate::runtime::spawn(async move { client.subscribe(&candidate, priority).await });
        self.subscribing.push((row.label.clone(), task));
    }

    pub fn poll(&mut self, toasts: &mut Toasts) {
        if let Some((query, task)) = &mut self.searching {
            match task.try_recv() {
                Ok(Ok(found)) => {
                    log::info!("found {} channel(s) for '{query}'", found.len());
                    self.rows
                        .replace(found.into_iter().map(CandidateRow::new).collect());
                    self.searching.take();
                }
                Ok(Err(err)) => {
                    log::warn!("search for '{query}' failed: {err:#}");
                    toasts.error(format!("Search for '{query}' failed"));
                    self.searching.take();
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Closed) => {
                    self.searching.take();
                }
            }
        }

        self.subscribing.retain_mut(|(title, task)| match task.try_recv() {
            Ok(Ok(())) => {
                toasts.success(format!("Subscribed to {title}"));
                false
            }
            Ok(Err(err)) => {
                log::warn!("{err:#}");
                toasts.error(format!("Cannot subscribe to {title}"));
                false
            }
            Err(TryRecvError::Empty) => true,
            Err(TryRecvError::Closed) => false,
        });
    }

    pub fn display(
        &mut self,
        ui: &mut egui::Ui,
        client: &api::Client,
        cache: &mut img::Cache,
        upgrader: &mut thumbnail::Upgrader,
    ) {
        ui.horizontal(|ui| {
            let resp = ui.add(
                TextEdit::singleline(&mut self.input)
                    .hint_text("Channel name, username or id")
                    .desired_width(f32::INFINITY),
            );

            let entered = resp.lost_focus() && ui.input().key_pressed(egui::Key::Enter);
            if ui.button("Search").clicked() || entered {
                self.submit(client);
            }
        });

        if self.is_searching() {
            ui.label(RichText::new("Searching…").weak());
        }

        if self.rows.is_none() {
            return;
        }

        ui.separator();
        ui.label(RichText::new("Results").heading());

        ComboBox::from_label("Priority")
            .selected_text(self.priority.label())
            .show_ui(ui, |ui| {
                for priority in Priority::ALL {
                    ui.selectable_value(&mut self.priority, priority, priority.label());
                }
            });

        let rows = self.rows();
        let mut chosen = None;
        Grid::new("search_results")
            .num_columns(3)
            .striped(true)
            .show(ui, |ui| {
                for row in rows {
                    thumbnail::show(ui, &row.image_src, cache, upgrader, vec2(88.0, 88.0));
                    let fields = row.form_fields().map(|(k, v)| format!("{k}: {v}"));
                    ui.label(row.label.as_str()).on_hover_text(fields.join("\n"));
                    if ui.button("Subscribe").clicked() {
                        chosen.replace(row.clone());
                    }
                    ui.end_row();
                }
            });

        if let Some(row) = chosen {
            self.subscribe(client, &row);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockito::{Matcher, Server};

    use super::*;
    use crate::Config;

    fn candidate(id: &str) -> ChannelCandidate {
        ChannelCandidate {
            title: format!("Channel {id}"),
            thumbnail: format!("https://yt3.example.com/{id}.jpg"),
            id: id.to_string(),
        }
    }

    #[test]
    fn blank_query_is_not_taken() {
        let mut search = Search::default();
        for input in ["", "   ", "\n\t"] {
            search.input = input.to_string();
            assert_eq!(search.take_query(), None);
            assert_eq!(search.input, input);
        }
    }

    #[test]
    fn query_is_trimmed_and_input_cleared() {
        let mut search = Search {
            input: String::from("  lofi girl "),
            ..Search::default()
        };
        assert_eq!(search.take_query().as_deref(), Some("lofi girl"));
        assert!(search.input.is_empty());
    }

    #[test]
    fn blank_submit_issues_no_request() {
        let client = api::Client::create(Config {
            base_url: String::from("http://127.0.0.1:9"),
            ..Config::default()
        })
        .unwrap();

        let mut search = Search {
            input: String::from("    "),
            ..Search::default()
        };
        assert!(!search.submit(&client));
        assert!(!search.is_searching());
    }

    #[test]
    fn row_carries_hidden_fields() {
        let row = CandidateRow::new(candidate("UCabc"));
        assert_eq!(row.image_src, "https://yt3.example.com/UCabc.jpg");
        assert_eq!(row.label, "Channel UCabc");
        assert_eq!(
            row.form_fields(),
            [
                ("title", "Channel UCabc"),
                ("thumbnail", "https://yt3.example.com/UCabc.jpg"),
                ("id", "UCabc"),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn submit_renders_one_row_per_candidate() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/notifpy/find-channel")
            .match_header("x-csrftoken", "tok")
            .match_body(Matcher::Exact("lofi".into()))
            .with_status(200)
            .with_body(
                serde_json::to_string(&[candidate("UCa"), candidate("UCb")]).unwrap(),
            )
            .create_async()
            .await;

        let client = api::Client::create(Config {
            base_url: server.url(),
            csrf_token: String::from("tok"),
            ..Config::default()
        })
        .unwrap();

        let mut search = Search {
            input: String::from(" lofi "),
            ..Search::default()
        };
        let mut toasts = Toasts::new();

        assert!(search.submit(&client));
        assert!(search.input.is_empty());

        for _ in 0..100 {
            search.poll(&mut toasts);
            if !search.is_searching() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        mock.assert_async().await;
        let ids = search
            .rows()
            .iter()
            .map(|row| row.candidate().id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, ["UCa", "UCb"]);
    }
}
