use std::time::Duration;

use eframe::{CreationContext, NativeOptions};
use egui::{Align, CentralPanel, Layout, RichText, TopBottomPanel};
use egui_notify::Toasts;

mod api;

mod config;
use config::Config;

mod image;
use crate::image as img;

mod repaint;
use repaint::Repaint;

mod runtime;

mod search;
use search::Search;

mod state;
use state::{State, Tab};

mod stream_list;
use stream_list::StreamList;

mod thumbnail;

struct Application {
    state: State,
    client: api::Client,
    cache: img::Cache,
    upgrader: thumbnail::Upgrader,
    streams: StreamList,
    search: Search,
    toasts: Toasts,
}

impl Application {
    const SAVE_KEY: &'static str = concat!(env!("CARGO_PKG_NAME"), "_settings");

    // keeps the elapsed labels on stream cards current
    const TICK: Duration = Duration::from_secs(30);
}

impl Application {
    fn new(
        state: State,
        client: api::Client,
        http: reqwest::Client,
        repaint: impl Repaint + 'static,
    ) -> Self {
        let reveal_delay = client.config().reveal_delay;
        let upgrader = thumbnail::Upgrader::spawn(
            thumbnail::HttpProbe::new(http.clone()),
            reveal_delay,
            repaint.clone(),
        );

        let mut streams = StreamList::default();
        streams.load(&client);

        Self {
            state,
            cache: img::Cache::new(img::Loader::spawn(http, repaint)),
            upgrader,
            client,
            streams,
            search: Search::default(),
            toasts: Toasts::new(),
        }
    }

    fn poll(&mut self) {
        self.cache.poll();
        self.upgrader.poll();
        self.streams.poll();
        self.search.poll(&mut self.toasts);
    }

    fn display_tabs(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            for tab in Tab::ALL {
                ui.selectable_value(&mut self.state.tab, tab, tab.label());
            }

            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                if self.state.tab == Tab::Streams {
                    let refresh =
                        ui.add_enabled(!self.streams.is_loading(), egui::Button::new("⟳"));
                    if refresh.on_hover_text("Reload live streams").clicked() {
                        self.streams.load(&self.client);
                    }
                }

                if !self.upgrader.is_settled() {
                    ui.label(RichText::new("Upgrading thumbnails…").weak());
                }
            });
        });
    }

    fn display_streams(&mut self, ui: &mut egui::Ui) {
        if self.streams.is_loading() && self.streams.content().cards().is_empty() {
            ui.label(RichText::new("Loading…").weak());
        }

        self.streams
            .display(ui, &mut self.cache, &mut self.upgrader, self.state.icon_size);
    }

    fn display_search(&mut self, ui: &mut egui::Ui) {
        self.search
            .display(ui, &self.client, &mut self.cache, &mut self.upgrader);
    }
}

impl eframe::App for Application {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll();
        self.toasts.show(ctx);

        TopBottomPanel::top("tabs").show(ctx, |ui| self.display_tabs(ui));

        CentralPanel::default().show(ctx, |ui| match self.state.tab {
            Tab::Streams => self.display_streams(ui),
            Tab::Search => self.display_search(ui),
        });

        ctx.request_repaint_after(Self::TICK);
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        match serde_json::to_string(&self.state) {
            Ok(data) => storage.set_string(Self::SAVE_KEY, data),
            Err(err) => log::warn!("cannot save settings: {err}"),
        }
    }
}

fn load_state(cc: &CreationContext) -> State {
    cc.storage
        .and_then(|storage| storage.get_string(Application::SAVE_KEY))
        .and_then(|data| serde_json::from_str(&data).ok())
        .unwrap_or_else(|| {
            log::warn!("cannot load previous state, defaulting it");
            State::default()
        })
}

fn main() -> anyhow::Result<()> {
    simple_env_load::load_env_from([".dev.env", ".secrets.env"]);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    log::info!("using {}", config.base_url);

    let wait = runtime::start()?;

    let client = api::Client::create(config)?;
    let http = reqwest::Client::builder()
        .user_agent(api::USER_AGENT)
        .build()?;

    eframe::run_native(
        "notifview",
        NativeOptions::default(),
        Box::new(move |cc| {
            let state = load_state(cc);
            cc.egui_ctx.set_pixels_per_point(state.pixels_per_point);

            Box::new(Application::new(
                state,
                client,
                http,
                cc.egui_ctx.clone(),
            ))
        }),
    );

    wait();
    Ok(())
}
