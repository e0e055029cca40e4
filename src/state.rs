#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Tab {
    #[default]
    Streams,
    Search,
}

impl Tab {
    pub const ALL: [Self; 2] = [Self::Streams, Self::Search];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Streams => "Live",
            Self::Search => "Find a channel",
        }
    }
}

#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct State {
    pub icon_size: f32,
    pub pixels_per_point: f32,
    pub tab: Tab,
}

impl Default for State {
    fn default() -> Self {
        Self {
            icon_size: 48.0,
            pixels_per_point: 1.5,
            tab: Tab::default(),
        }
    }
}
