//! Calendar content production.
//!
//! The scheduler only depends on the [`ContentProducer`] trait. The shipped
//! implementation fetches the daily calendar image from a list of HTTP
//! endpoints, falling back to a local backup image, and renders a caption
//! from rotating message templates.

use crate::config::ContentConfig;
use crate::error::{BotError, Result};
use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Responses smaller than this are assumed to be error pages, not images.
const MIN_IMAGE_BYTES: usize = 1000;

/// Renderable content for one send: caption text plus image bytes.
#[derive(Debug, Clone)]
pub struct CalendarContent {
    /// Caption text, already formatted with the current time.
    pub text: String,
    /// Raw image bytes.
    pub image: Vec<u8>,
    /// Image format suffix (`jpg`, `png`, `webp`, `gif`).
    pub image_format: String,
}

/// Caption template with a `{time}` placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    /// Template name, used only for logging.
    pub name: String,
    /// Caption body; `{time}` is replaced with `YYYY-MM-DD HH:MM`.
    pub format: String,
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self {
            name: "default".to_owned(),
            format: "Daily slacking calendar\nCurrent time: {time}".to_owned(),
        }
    }
}

/// Produces renderable calendar content.
#[async_trait]
pub trait ContentProducer: Send + Sync {
    /// Produce content for one send, or [`BotError::ContentUnavailable`].
    async fn produce(&self) -> Result<CalendarContent>;
}

/// HTTP-backed producer: tries each endpoint in order, then the local
/// backup image.
pub struct HttpCalendarProducer {
    client: reqwest::Client,
    endpoints: Vec<String>,
    templates: Vec<MessageTemplate>,
    backup_image: Option<PathBuf>,
    next_template: AtomicUsize,
}

impl HttpCalendarProducer {
    /// Build a producer from the content section of the config.
    pub fn new(config: &ContentConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BotError::Config(format!("cannot build HTTP client: {e}")))?;

        let templates = if config.templates.is_empty() {
            vec![MessageTemplate::default()]
        } else {
            config.templates.clone()
        };

        info!(
            "calendar producer ready: {} endpoints, {} templates",
            config.api_endpoints.len(),
            templates.len()
        );

        Ok(Self {
            client,
            endpoints: config.api_endpoints.clone(),
            templates,
            backup_image: config.backup_image.clone(),
            next_template: AtomicUsize::new(0),
        })
    }

    /// Render the next caption, rotating through templates round-robin.
    fn caption(&self) -> String {
        let index = self.next_template.fetch_add(1, Ordering::Relaxed) % self.templates.len();
        let template = &self.templates[index];
        debug!("using caption template `{}`", template.name);
        template
            .format
            .replace("{time}", &Local::now().format("%Y-%m-%d %H:%M").to_string())
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, String)> {
        let response = self
            .client
            .get(url)
            .header(
                reqwest::header::USER_AGENT,
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
            )
            .header(
                reqwest::header::ACCEPT,
                "image/jpeg,image/png,image/webp,image/*,*/*",
            )
            .send()
            .await
            .map_err(|e| BotError::ContentUnavailable(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BotError::ContentUnavailable(format!(
                "{url} returned status {status}"
            )));
        }

        let format = image_format(
            response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BotError::ContentUnavailable(format!("reading body from {url}: {e}")))?;

        if bytes.len() < MIN_IMAGE_BYTES {
            return Err(BotError::ContentUnavailable(format!(
                "{url} returned {} bytes, too small to be an image",
                bytes.len()
            )));
        }

        Ok((bytes.to_vec(), format))
    }

    fn backup(&self) -> Option<(Vec<u8>, String)> {
        let path = self.backup_image.as_ref()?;
        match std::fs::read(path) {
            Ok(bytes) => {
                info!("all endpoints failed, using backup image {}", path.display());
                let format = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .unwrap_or("jpg")
                    .to_owned();
                Some((bytes, format))
            }
            Err(e) => {
                warn!("cannot read backup image {}: {e}", path.display());
                None
            }
        }
    }
}

/// Map a content-type header to an image format suffix. Unknown or missing
/// types default to jpg, matching what the calendar APIs actually serve.
fn image_format(content_type: Option<&str>) -> String {
    let ct = content_type.unwrap_or_default();
    for format in ["png", "webp", "gif"] {
        if ct.contains(format) {
            return format.to_owned();
        }
    }
    "jpg".to_owned()
}

#[async_trait]
impl ContentProducer for HttpCalendarProducer {
    async fn produce(&self) -> Result<CalendarContent> {
        for (index, url) in self.endpoints.iter().enumerate() {
            match self.download(url).await {
                Ok((image, image_format)) => {
                    debug!("fetched calendar image from endpoint {}", index + 1);
                    return Ok(CalendarContent {
                        text: self.caption(),
                        image,
                        image_format,
                    });
                }
                Err(e) => warn!("endpoint {} failed: {e}", index + 1),
            }
        }

        if let Some((image, image_format)) = self.backup() {
            return Ok(CalendarContent {
                text: self.caption(),
                image,
                image_format,
            });
        }

        Err(BotError::ContentUnavailable(format!(
            "all {} endpoints failed and no backup image is configured",
            self.endpoints.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_with(endpoints: Vec<String>) -> ContentConfig {
        ContentConfig {
            api_endpoints: endpoints,
            request_timeout_secs: 2,
            templates: Vec::new(),
            backup_image: None,
        }
    }

    fn image_body() -> Vec<u8> {
        vec![0xAB; 4096]
    }

    #[tokio::test]
    async fn produce_returns_image_and_formatted_caption() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendar"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(image_body()),
            )
            .mount(&server)
            .await;

        let producer =
            HttpCalendarProducer::new(&config_with(vec![format!("{}/calendar", server.uri())]))
                .unwrap();
        let content = producer.produce().await.unwrap();

        assert_eq!(content.image.len(), 4096);
        assert_eq!(content.image_format, "png");
        assert!(content.text.contains("Current time: "));
        assert!(!content.text.contains("{time}"));
    }

    #[tokio::test]
    async fn produce_falls_through_to_next_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(image_body()))
            .mount(&server)
            .await;

        let producer = HttpCalendarProducer::new(&config_with(vec![
            format!("{}/broken", server.uri()),
            format!("{}/ok", server.uri()),
        ]))
        .unwrap();

        let content = producer.produce().await.unwrap();
        assert_eq!(content.image_format, "jpg"); // no content-type header
    }

    #[tokio::test]
    async fn tiny_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
            .mount(&server)
            .await;

        let producer =
            HttpCalendarProducer::new(&config_with(vec![server.uri()])).unwrap();
        let err = producer.produce().await.unwrap_err();
        assert!(matches!(err, BotError::ContentUnavailable(_)));
    }

    #[tokio::test]
    async fn backup_image_used_when_all_endpoints_fail() {
        let dir = tempfile::tempdir().unwrap();
        let backup = dir.path().join("backup.jpg");
        std::fs::write(&backup, vec![1u8; 2048]).unwrap();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut config = config_with(vec![server.uri()]);
        config.backup_image = Some(backup);
        let producer = HttpCalendarProducer::new(&config).unwrap();

        let content = producer.produce().await.unwrap();
        assert_eq!(content.image.len(), 2048);
        assert_eq!(content.image_format, "jpg");
    }

    #[tokio::test]
    async fn no_endpoints_and_no_backup_is_content_unavailable() {
        let producer = HttpCalendarProducer::new(&config_with(Vec::new())).unwrap();
        assert!(matches!(
            producer.produce().await,
            Err(BotError::ContentUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn templates_rotate_round_robin() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(image_body()))
            .mount(&server)
            .await;

        let mut config = config_with(vec![server.uri()]);
        config.templates = vec![
            MessageTemplate {
                name: "a".to_owned(),
                format: "A {time}".to_owned(),
            },
            MessageTemplate {
                name: "b".to_owned(),
                format: "B {time}".to_owned(),
            },
        ];
        let producer = HttpCalendarProducer::new(&config).unwrap();

        let first = producer.produce().await.unwrap();
        let second = producer.produce().await.unwrap();
        let third = producer.produce().await.unwrap();
        assert!(first.text.starts_with("A "));
        assert!(second.text.starts_with("B "));
        assert!(third.text.starts_with("A "));
    }

    #[test]
    fn image_format_detection() {
        assert_eq!(image_format(Some("image/png")), "png");
        assert_eq!(image_format(Some("image/webp")), "webp");
        assert_eq!(image_format(Some("image/gif")), "gif");
        assert_eq!(image_format(Some("image/jpeg")), "jpg");
        assert_eq!(image_format(None), "jpg");
    }
}
