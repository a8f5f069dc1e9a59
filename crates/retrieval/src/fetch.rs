//! HTTP page fetcher.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use rustscout_core::{FetchRequest, PageData, PageFetcher, RetrievalError};
use tracing::{debug, warn};

use crate::extract;

/// Fetches pages over HTTP(S) with `reqwest` and extracts their text.
pub struct HttpPageFetcher {
    client: reqwest::Client,
    max_links: usize,
}

impl HttpPageFetcher {
    pub fn new(max_links: usize) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| RetrievalError::Request(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, max_links })
    }
}

fn header_map(request: &FetchRequest) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &request.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid request header"),
        }
    }
    headers
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<PageData, RetrievalError> {
        debug!(url = %request.url, "Fetching page");

        let response = self
            .client
            .get(&request.url)
            .headers(header_map(request))
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RetrievalError::PageTimeout {
                        secs: request.timeout.as_secs(),
                    }
                } else {
                    RetrievalError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::Http {
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                RetrievalError::PageTimeout {
                    secs: request.timeout.as_secs(),
                }
            } else {
                RetrievalError::Request(format!("Failed to read response body: {e}"))
            }
        })?;

        if content_type.contains("html") || content_type.contains("xml") {
            Ok(extract::extract_page(&body, &final_url, self.max_links))
        } else if content_type.starts_with("text/") || content_type.contains("json") {
            Ok(PageData {
                url: final_url,
                title: extract::NO_TITLE.to_string(),
                text: body.trim().to_string(),
                ..PageData::default()
            })
        } else {
            Err(RetrievalError::Parse(format!(
                "unsupported content type '{content_type}'"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn request(url: String) -> FetchRequest {
        FetchRequest {
            url,
            timeout: Duration::from_secs(5),
            headers: BTreeMap::from([("User-Agent".to_string(), "rustscout-test".to_string())]),
        }
    }

    #[tokio::test]
    async fn fetches_and_extracts_html() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/article")
            .match_header("user-agent", "rustscout-test")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body("<html><head><title>Hi</title></head><body><p>Body text</p></body></html>")
            .create_async()
            .await;

        let fetcher = HttpPageFetcher::new(20).unwrap();
        let page = fetcher
            .fetch(&request(format!("{}/article", server.url())))
            .await
            .unwrap();
        assert_eq!(page.title, "Hi");
        assert_eq!(page.text, "Body text");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = HttpPageFetcher::new(20).unwrap();
        let err = fetcher
            .fetch(&request(format!("{}/missing", server.url())))
            .await
            .unwrap_err();
        assert_eq!(err, RetrievalError::Http { status: 404 });
    }

    #[tokio::test]
    async fn plain_text_is_passed_through() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/notes.txt")
            .with_status(200)
            .with_header("content-type", "text/plain")
            .with_body("  just text \n")
            .create_async()
            .await;

        let fetcher = HttpPageFetcher::new(20).unwrap();
        let page = fetcher
            .fetch(&request(format!("{}/notes.txt", server.url())))
            .await
            .unwrap();
        assert_eq!(page.text, "just text");
        assert_eq!(page.title, extract::NO_TITLE);
    }

    #[test]
    fn invalid_headers_are_skipped() {
        let mut req = request("http://localhost".into());
        req.headers.insert("Bad Header".into(), "x".into());
        let headers = header_map(&req);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("user-agent"));
    }
}
