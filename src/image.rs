use std::collections::{HashMap, HashSet};

use anyhow::Context as _;
use egui::{Color32, Vec2};
use egui_extras::RetainedImage;
use image::ImageFormat;
use tokio_stream::StreamExt as _;

use crate::Repaint;

pub struct Image {
    retained: RetainedImage,
}

impl Image {
    pub fn show_size(&self, ui: &mut egui::Ui, size: Vec2) -> egui::Response {
        self.retained.show_size(ui, size)
    }

    /// Draws the image faded by `opacity` (0.0 ..= 1.0).
    pub fn show_faded(&self, ui: &mut egui::Ui, size: Vec2, opacity: f32) -> egui::Response {
        let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        let image = egui::Image::new(self.retained.texture_id(ui.ctx()), size)
            .tint(Color32::from_white_alpha(alpha));
        ui.add(image)
    }

    #[cfg(test)]
    pub fn size(&self) -> [usize; 2] {
        self.retained.size()
    }

    fn decode(name: &str, data: &[u8]) -> anyhow::Result<Self> {
        match image::guess_format(&data[..data.len().min(128)])
            .with_context(|| anyhow::anyhow!("cannot guess format for: '{name}'"))?
        {
            ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif => {}
            fmt => anyhow::bail!("unsupported format for '{name}': {fmt:?}"),
        }

        RetainedImage::from_image_bytes(name, data)
            .map(|retained| Self { retained })
            .map_err(|err| anyhow::anyhow!("cannot load '{name}': {err}"))
    }
}

pub struct Cache {
    map: HashMap<String, Image>,
    loader: Loader,
}

impl Cache {
    pub fn new(loader: Loader) -> Self {
        Self {
            map: HashMap::default(),
            loader,
        }
    }

    pub fn get(&mut self, url: &str) -> Option<&Image> {
        if url.is_empty() {
            return None;
        }

        match self.map.get(url) {
            Some(img) => Some(img),
            None => {
                self.loader.request(url);
                None
            }
        }
    }

    pub fn poll(&mut self) {
        for (k, v) in self.loader.produce.try_iter() {
            self.map.insert(k, v);
        }
    }
}

#[derive(Clone)]
pub struct Loader {
    submit: flume::Sender<String>,
    produce: flume::Receiver<(String, Image)>,
}

impl Loader {
    pub fn spawn(client: reqwest::Client, repaint: impl Repaint + 'static) -> Self {
        let (submit, submit_rx) = flume::unbounded::<String>();
        let (produce_tx, produce) = flume::unbounded();

        let _ = crate::runtime::spawn(async move {
            let mut seen = HashSet::new();
            let mut stream = submit_rx.into_stream();

            while let Some(url) = stream.next().await {
                if !seen.insert(url.clone()) {
                    continue;
                }

                let client = client.clone();
                let tx = produce_tx.clone();
                let repaint = repaint.clone();

                tokio::spawn(async move {
                    let data = match Self::fetch(&client, &url).await {
                        Ok(data) => data,
                        Err(err) => {
                            log::warn!("{err:#}");
                            return;
                        }
                    };

                    let _ = crate::runtime::blocking(move || match Image::decode(&url, &data) {
                        Ok(img) => {
                            let _ = tx.send((url, img));
                            repaint.repaint();
                        }
                        Err(err) => log::warn!("cannot decode: {err:#}"),
                    });
                });
            }
        });

        Self { submit, produce }
    }

    pub fn request(&self, url: &str) {
        let _ = self.submit.send(url.to_string());
    }

    async fn fetch(client: &reqwest::Client, url: &str) -> anyhow::Result<Vec<u8>> {
        log::debug!("getting: {url}");
        let resp = client
            .get(url)
            .send()
            .await
            .with_context(|| anyhow::anyhow!("cannot fetch: {url}"))?;

        let status = resp.status();
        anyhow::ensure!(status.is_success(), "cannot fetch: {url}: {status}");

        Ok(resp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
pub(crate) fn encode_png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::new_rgb8(width, height)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockito::Server;

    use super::*;

    #[test]
    fn decodes_png_and_rejects_garbage() {
        let img = Image::decode("fixture.png", &encode_png(16, 9)).unwrap();
        assert_eq!(img.size(), [16, 9]);

        assert!(Image::decode("garbage", b"definitely not an image").is_err());
    }

    #[tokio::test]
    async fn fetch_rejects_missing_assets() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing.jpg")
            .with_status(404)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let err = Loader::fetch(&client, &format!("{}/missing.jpg", server.url()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cache_fills_after_poll() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/avatar.png")
            .with_status(200)
            .with_body(encode_png(4, 4))
            .expect(1)
            .create_async()
            .await;

        let url = format!("{}/avatar.png", server.url());
        let mut cache = Cache::new(Loader::spawn(reqwest::Client::new(), ()));

        assert!(cache.get(&url).is_none());
        // a second miss must not issue a second fetch
        assert!(cache.get(&url).is_none());

        let mut found = false;
        for _ in 0..100 {
            cache.poll();
            if cache.get(&url).is_some() {
                found = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(found);
        mock.assert_async().await;
    }
}
