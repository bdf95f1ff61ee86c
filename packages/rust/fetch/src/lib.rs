//! Paper source retrieval.
//!
//! This crate provides:
//! - [`Fetcher`]: downloads a paper's source bundle over HTTP
//! - [`extract_archive`]: unpacks a downloaded bundle into a source tree
//!
//! The result is a plain directory (`<data_dir>/<paper id>/`) that the rest of
//! the pipeline consumes without knowing where it came from.

mod archive;

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

use papersplit_shared::{FetchConfig, PaperSplitError, Result};

pub use archive::{ExtractedKind, extract_archive};

/// User-Agent string for download requests.
const USER_AGENT: &str = concat!("papersplit/", env!("CARGO_PKG_VERSION"));

/// Suffix of the temporary archive file written next to the source tree.
const DOWNLOAD_SUFFIX: &str = "download";

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Downloads and unpacks paper source bundles.
pub struct Fetcher {
    config: FetchConfig,
    client: Client,
}

impl Fetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaperSplitError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// The download URL for `paper_id`.
    pub fn source_url(&self, paper_id: &str) -> Result<Url> {
        validate_paper_id(paper_id)?;
        let raw = self.config.source_url_template.replace("{id}", paper_id);
        Url::parse(&raw).map_err(|e| {
            PaperSplitError::config(format!("invalid source URL '{raw}': {e}"))
        })
    }

    /// Make the source tree for `paper_id` available under `data_dir`.
    ///
    /// An existing, non-empty `<data_dir>/<paper_id>/` is reused as-is.
    /// Returns the source directory.
    #[instrument(skip_all, fields(paper_id = %paper_id))]
    pub async fn fetch(&self, paper_id: &str, data_dir: &Path) -> Result<PathBuf> {
        let url = self.source_url(paper_id)?;
        let source_dir = data_dir.join(paper_id);

        if is_populated(&source_dir) {
            info!(dir = %source_dir.display(), "source already present, skipping download");
            return Ok(source_dir);
        }

        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| PaperSplitError::io(data_dir, e))?;

        let archive_path =
            data_dir.join(format!("{}.{DOWNLOAD_SUFFIX}", paper_id.replace('/', "_")));
        let size = self.download(&url, &archive_path).await?;
        info!(%url, bytes = size, "downloaded source bundle");

        let extract_from = archive_path.clone();
        let extract_to = source_dir.clone();
        let extracted =
            tokio::task::spawn_blocking(move || extract_archive(&extract_from, &extract_to))
                .await
                .map_err(|e| PaperSplitError::Archive(format!("extraction task failed: {e}")))?;

        if !self.config.keep_archive {
            if let Err(e) = tokio::fs::remove_file(&archive_path).await {
                debug!(path = %archive_path.display(), error = %e, "could not remove archive");
            }
        }

        let kind = match extracted {
            Ok(kind) => kind,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&source_dir).await;
                return Err(e);
            }
        };
        info!(dir = %source_dir.display(), ?kind, "source extracted");

        Ok(source_dir)
    }

    /// GET `url` into `dest`, returning the number of bytes written.
    async fn download(&self, url: &Url, dest: &Path) -> Result<usize> {
        debug!(%url, "requesting source bundle");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| PaperSplitError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaperSplitError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PaperSplitError::Network(format!("{url}: body read failed: {e}")))?;

        tokio::fs::write(dest, &body)
            .await
            .map_err(|e| PaperSplitError::io(dest, e))?;

        Ok(body.len())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Reject ids that could escape the data directory or break the URL.
///
/// Accepts new-style (`2401.00001v2`) and old-style (`hep-th/9901001`) ids.
pub fn validate_paper_id(paper_id: &str) -> Result<()> {
    let valid_chars = paper_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/'));

    let safe_segments = paper_id
        .split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..");

    if paper_id.is_empty() || !valid_chars || !safe_segments {
        return Err(PaperSplitError::validation(format!(
            "invalid paper id '{paper_id}'"
        )));
    }
    Ok(())
}

fn is_populated(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;
    use std::path::PathBuf;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    pub fn temp_dir(prefix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("{prefix}-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// An uncompressed tarball holding `files`.
    pub fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap()
    }

    pub fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::{gzip, tarball, temp_dir};

    fn config_for(server_uri: &str) -> FetchConfig {
        FetchConfig {
            source_url_template: format!("{server_uri}/src/{{id}}"),
            timeout_secs: 5,
            keep_archive: false,
        }
    }

    #[test]
    fn paper_id_validation() {
        assert!(validate_paper_id("2401.00001").is_ok());
        assert!(validate_paper_id("2401.00001v3").is_ok());
        assert!(validate_paper_id("hep-th/9901001").is_ok());

        assert!(validate_paper_id("").is_err());
        assert!(validate_paper_id("../etc").is_err());
        assert!(validate_paper_id("/abs").is_err());
        assert!(validate_paper_id("a b").is_err());
        assert!(validate_paper_id("x?y=1").is_err());
    }

    #[test]
    fn source_url_substitutes_id() {
        let fetcher = Fetcher::new(FetchConfig {
            source_url_template: "https://arxiv.org/src/{id}".into(),
            timeout_secs: 5,
            keep_archive: false,
        })
        .unwrap();
        let url = fetcher.source_url("2401.00001").unwrap();
        assert_eq!(url.as_str(), "https://arxiv.org/src/2401.00001");
    }

    #[tokio::test]
    async fn fetch_downloads_and_extracts() {
        let server = wiremock::MockServer::start().await;
        let bundle = gzip(&tarball(&[
            ("main.tex", "\\documentclass{article}\n\\input{intro}\n"),
            ("intro.tex", "\\section{Intro}\n"),
        ]));

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/src/2401.00001"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_bytes(bundle))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = temp_dir("ps-fetch");
        let fetcher = Fetcher::new(config_for(&server.uri())).unwrap();

        let dir = fetcher.fetch("2401.00001", &tmp).await.unwrap();
        assert_eq!(dir, tmp.join("2401.00001"));
        assert!(dir.join("main.tex").is_file());
        assert!(dir.join("intro.tex").is_file());
        assert!(!tmp.join("2401.00001.download").exists());

        // Second call reuses the extracted tree without a request.
        let again = fetcher.fetch("2401.00001", &tmp).await.unwrap();
        assert_eq!(again, dir);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn fetch_keeps_archive_when_configured() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/src/2401.00003"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_bytes(gzip(b"\\documentclass{article}\n")),
            )
            .mount(&server)
            .await;

        let tmp = temp_dir("ps-fetch");
        let mut config = config_for(&server.uri());
        config.keep_archive = true;
        let fetcher = Fetcher::new(config).unwrap();

        let dir = fetcher.fetch("2401.00003", &tmp).await.unwrap();
        assert!(dir.join("2401.00003.tex").is_file());
        assert!(tmp.join("2401.00003.download").is_file());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn fetch_reports_http_errors() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = temp_dir("ps-fetch");
        let fetcher = Fetcher::new(config_for(&server.uri())).unwrap();

        let err = fetcher.fetch("2401.99999", &tmp).await.unwrap_err();
        assert!(matches!(err, PaperSplitError::Network(_)));
        assert!(err.to_string().contains("404"));
        assert!(!tmp.join("2401.99999").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
