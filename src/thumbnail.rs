//! Progressive thumbnail upgrades.
//!
//! Thumbnail URLs carry their quality tier in the path (`mqdefault`,
//! `maxresdefault`). A missing tier is still served, as a 120px wide
//! placeholder, so the only way to know whether a better image exists is to
//! load it and look at its width.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    io::Cursor,
    time::{Duration, Instant},
};

use anyhow::Context as _;
use egui::Vec2;
use tokio_stream::StreamExt as _;

use crate::{image as img, Repaint};

/// Natural width of the placeholder served for a tier that does not exist.
pub const MISSING_WIDTH: u32 = 120;

const MEDIUM: &str = "mqdefault";
const MAXRES: &str = "maxresdefault";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Tier {
    MaxRes,
    Medium,
}

/// Whether `src` names a quality tier that can be upgraded.
pub fn has_tier(src: &str) -> bool {
    src.contains(MEDIUM) || src.contains(MAXRES)
}

impl Tier {
    pub fn url(self, src: &str) -> String {
        match self {
            Self::MaxRes => src.replace(MEDIUM, MAXRES),
            Self::Medium => src.replace(MAXRES, MEDIUM),
        }
    }

    const fn fallback(self) -> Option<Self> {
        match self {
            Self::MaxRes => Some(Self::Medium),
            Self::Medium => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeState {
    Probing { tier: Tier, url: String },
    Swapped(String),
    Unchanged,
}

impl ProbeState {
    pub fn start(src: &str) -> Self {
        Self::probing(Tier::MaxRes, src)
    }

    fn probing(tier: Tier, src: &str) -> Self {
        Self::Probing {
            tier,
            url: tier.url(src),
        }
    }

    /// Feeds the natural width of the asset being probed, `None` if it did not load.
    pub fn advance(self, src: &str, width: Option<u32>) -> Self {
        let Self::Probing { tier, url } = self else { return self };

        match width {
            Some(width) if width != MISSING_WIDTH => Self::Swapped(url),
            _ => match tier.fallback() {
                Some(next) => Self::probing(next, src),
                None => Self::Unchanged,
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Probing { .. })
    }

    /// The url an image marked with `src` should display in this state.
    pub fn resolve<'a>(&'a self, src: &'a str) -> &'a str {
        match self {
            Self::Swapped(url) => url,
            _ => src,
        }
    }
}

pub trait Probe: Clone + Send + Sync + 'static {
    fn natural_width(&self, url: &str) -> impl Future<Output = Option<u32>> + Send;
}

/// Walks the tier ladder for `src`, awaiting one probe at a time.
pub async fn upgrade(src: &str, probe: &impl Probe) -> ProbeState {
    let mut state = ProbeState::start(src);
    while let ProbeState::Probing { url, .. } = &state {
        let url = url.clone();
        let width = probe.natural_width(&url).await;
        log::debug!("probed {url}: {width:?}");
        state = state.advance(src, width);
    }
    state
}

#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn dimensions(&self, url: &str) -> anyhow::Result<(u32, u32)> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        anyhow::ensure!(status.is_success(), "{url} responded with {status}");

        let data = resp.bytes().await?;
        image::io::Reader::new(Cursor::new(&data[..]))
            .with_guessed_format()?
            .into_dimensions()
            .with_context(|| anyhow::anyhow!("cannot read dimensions of {url}"))
    }
}

impl Probe for HttpProbe {
    fn natural_width(&self, url: &str) -> impl Future<Output = Option<u32>> + Send {
        let this = self.clone();
        let url = url.to_string();
        async move {
            match this.dimensions(&url).await {
                Ok((width, _)) => Some(width),
                Err(err) => {
                    log::warn!("probe failed: {err:#}");
                    None
                }
            }
        }
    }
}

struct Settled {
    state: ProbeState,
    at: Instant,
}

pub struct Upgrader {
    submit: flume::Sender<String>,
    produce: flume::Receiver<(String, ProbeState)>,
    requested: HashSet<String>,
    settled: HashMap<String, Settled>,
    outstanding: usize,
    reveal_delay: Duration,
}

impl Upgrader {
    pub fn spawn(probe: impl Probe, reveal_delay: Duration, repaint: impl Repaint + 'static) -> Self {
        let (submit, submit_rx) = flume::unbounded::<String>();
        let (produce_tx, produce) = flume::unbounded();

        let _ = crate::runtime::spawn(async move {
            let mut stream = submit_rx.into_stream();
            while let Some(src) = stream.next().await {
                let probe = probe.clone();
                let tx = produce_tx.clone();
                let repaint = repaint.clone();

                tokio::spawn(async move {
                    let state = upgrade(&src, &probe).await;
                    if tx.send_async((src, state)).await.is_ok() {
                        repaint.repaint();
                        repaint.repaint_after(reveal_delay);
                    }
                });
            }
        });

        Self {
            submit,
            produce,
            requested: HashSet::new(),
            settled: HashMap::new(),
            outstanding: 0,
            reveal_delay,
        }
    }

    /// Marks `src` for upgrading. Repeated requests and srcs without a tier are ignored.
    pub fn request(&mut self, src: &str) {
        if !has_tier(src) || !self.requested.insert(src.to_string()) {
            return;
        }

        if self.submit.send(src.to_string()).is_ok() {
            self.outstanding += 1;
        }
    }

    pub fn poll(&mut self) {
        for (src, state) in self.produce.try_iter() {
            debug_assert!(state.is_terminal(), "unsettled thumbnail state for {src}");
            self.outstanding = self.outstanding.saturating_sub(1);
            self.settled.insert(
                src,
                Settled {
                    state,
                    at: Instant::now(),
                },
            );

            if self.outstanding == 0 {
                log::debug!("all {} thumbnail(s) settled", self.settled.len());
            }
        }
    }

    /// Every requested thumbnail has reached a terminal state.
    pub fn is_settled(&self) -> bool {
        self.outstanding == 0
    }

    #[cfg(test)]
    pub fn state(&self, src: &str) -> Option<&ProbeState> {
        self.settled.get(src).map(|s| &s.state)
    }

    /// The url to display for `src`, and whether it is ready to be revealed.
    pub fn resolve<'a>(&'a self, src: &'a str) -> (&'a str, bool) {
        if !has_tier(src) {
            return (src, true);
        }

        match self.settled.get(src) {
            Some(Settled { state, at }) => (state.resolve(src), at.elapsed() >= self.reveal_delay),
            None => (src, false),
        }
    }
}

/// Shows the image marked with `src`, upgraded once its probe has settled.
pub fn show(
    ui: &mut egui::Ui,
    src: &str,
    cache: &mut img::Cache,
    upgrader: &mut Upgrader,
    size: Vec2,
) -> egui::Response {
    if !has_tier(src) {
        return match cache.get(src) {
            Some(image) => image.show_size(ui, size),
            None => ui.allocate_response(size, egui::Sense::hover()),
        };
    }

    upgrader.request(src);
    let (url, revealed) = upgrader.resolve(src);

    // hidden while probing, faded in once the reveal delay has passed
    let opacity = ui.ctx().animate_bool(egui::Id::new(("thumbnail", src)), revealed);

    match cache.get(url) {
        Some(image) => image.show_faded(ui, size, opacity),
        None => ui.allocate_response(size, egui::Sense::hover()),
    }
}
