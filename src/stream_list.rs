use egui::{vec2, Align, Layout, RichText, ScrollArea};
use time::{
    format_description::{well_known::Rfc3339, FormatItem},
    macros::format_description,
    OffsetDateTime, PrimitiveDateTime,
};
use tokio::sync::oneshot::Receiver;

use crate::{api, image as img, thumbnail};

pub const NO_ACTIVE_STREAM: &str = "No active stream.";

/// Elapsed time as `{hours}h{minutes:02}`, with minutes rounded half-up.
pub fn format_elapsed(elapsed_ms: i128) -> String {
    let secs = elapsed_ms.max(0) / 1000;
    let minutes = (secs + 30) / 60;
    format!("{}h{:02}", minutes / 60, minutes % 60)
}

fn parse_started_at(input: &str) -> Option<OffsetDateTime> {
    const NAIVE: &[&[FormatItem<'static>]] = &[
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    ];

    let input = input.trim();
    if let Ok(ts) = OffsetDateTime::parse(input, &Rfc3339) {
        return Some(ts);
    }

    NAIVE
        .iter()
        .find_map(|fmt| PrimitiveDateTime::parse(input, *fmt).ok())
        .map(PrimitiveDateTime::assume_utc)
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamCard {
    pub avatar_src: String,
    pub avatar_alt: String,
    pub href: String,
    pub screenshot_src: String,
    pub name: String,
    pub title: String,
    pub category: String,
    pub viewers: String,
    pub started_at: Option<OffsetDateTime>,
}

impl StreamCard {
    pub fn bind(entry: api::StreamEntry) -> Self {
        let started_at = parse_started_at(&entry.started_at);
        if started_at.is_none() && !entry.started_at.is_empty() {
            log::warn!("cannot parse start time for {}: {}", entry.name, entry.started_at);
        }

        Self {
            avatar_alt: entry.name.clone(),
            avatar_src: entry.thumb,
            href: entry.lnk,
            screenshot_src: entry.screen,
            name: entry.name,
            title: entry.title,
            category: entry.game,
            viewers: entry.viewer_count.map(|c| c.to_string()).unwrap_or_default(),
            started_at,
        }
    }

    pub fn elapsed_label(&self, now: OffsetDateTime) -> String {
        self.started_at
            .map(|start| format_elapsed((now - start).whole_milliseconds()))
            .unwrap_or_default()
    }

    pub fn tooltip(&self) -> String {
        format!("{} • {}", self.category, self.title)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Content {
    #[default]
    Untouched,
    Empty,
    Cards(Vec<StreamCard>),
}

impl Content {
    pub fn from_entries(entries: Vec<api::StreamEntry>) -> Self {
        if entries.is_empty() {
            return Self::Empty;
        }
        Self::Cards(entries.into_iter().map(StreamCard::bind).collect())
    }

    pub fn message(&self) -> Option<&'static str> {
        matches!(self, Self::Empty).then_some(NO_ACTIVE_STREAM)
    }

    pub fn cards(&self) -> &[StreamCard] {
        match self {
            Self::Cards(cards) => cards,
            _ => &[],
        }
    }
}

#[derive(Default)]
pub struct StreamList {
    content: Content,
    pending: Option<Receiver<anyhow::Result<Vec<api::StreamEntry>>>>,
}

impl StreamList {
    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn load(&mut self, client: &api::Client) {
        if self.is_loading() {
            return;
        }

        let client = client.clone();
        self.pending
            .replace(crate::runtime::spawn(async move { client.get_streams().await }));
    }

    pub fn poll(&mut self) {
        use tokio::sync::oneshot::error::TryRecvError;

        let Some(pending) = &mut self.pending else { return };
        match pending.try_recv() {
            Ok(result) => {
                self.pending.take();
                self.apply(result);
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Closed) => {
                log::warn!("stream request was dropped");
                self.pending.take();
            }
        }
    }

    fn apply(&mut self, result: anyhow::Result<Vec<api::StreamEntry>>) {
        match result {
            Ok(entries) => {
                log::info!("found {} stream(s)", entries.len());
                self.content = Content::from_entries(entries);
            }
            Err(err) => log::warn!("cannot load streams: {err:#}"),
        }
    }

    pub fn display(
        &mut self,
        ui: &mut egui::Ui,
        cache: &mut img::Cache,
        upgrader: &mut thumbnail::Upgrader,
        icon_size: f32,
    ) {
        if let Some(message) = self.content.message() {
            ui.label(message);
            return;
        }

        let now = OffsetDateTime::now_utc();
        ScrollArea::vertical()
            .auto_shrink([false; 2])
            .show(ui, |ui| {
                for card in self.content.cards() {
                    ui.group(|ui| Self::display_card(ui, card, now, cache, upgrader, icon_size));
                }
            });
    }

    fn display_card(
        ui: &mut egui::Ui,
        card: &StreamCard,
        now: OffsetDateTime,
        cache: &mut img::Cache,
        upgrader: &mut thumbnail::Upgrader,
        icon_size: f32,
    ) {
        ui.horizontal(|ui| {
            match cache.get(&card.avatar_src) {
                Some(avatar) => {
                    avatar
                        .show_size(ui, vec2(icon_size, icon_size))
                        .on_hover_text(card.avatar_alt.as_str());
                }
                None => {
                    ui.allocate_space(vec2(icon_size, icon_size));
                }
            }

            ui.vertical(|ui| {
                ui.hyperlink_to(RichText::new(&card.name).strong(), &card.href);
                ui.label(card.title.as_str()).on_hover_text(card.tooltip());
                ui.label(RichText::new(&card.category).weak());
            });

            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                ui.label(card.elapsed_label(now));
                ui.label(format!("👁 {}", card.viewers));
            });
        });

        if !card.screenshot_src.is_empty() {
            thumbnail::show(ui, &card.screenshot_src, cache, upgrader, vec2(320.0, 180.0));
        }
    }
}
