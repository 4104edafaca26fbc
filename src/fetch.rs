use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::json;
use tracing::{debug, error};

use crate::alert::Notify;
use crate::config::Settings;

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<script>.*?</script>").unwrap());
static DECL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!.*?>").unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

/// Form fields sent with a continuation request.
pub type Params = [(String, String)];

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
}

/// Raw transport. GET without params, form POST with them.
#[allow(async_fn_in_trait)]
pub trait Fetch {
    async fn get(&self, url: &str, params: Option<&Params>) -> Result<Vec<u8>, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(HttpFetcher { client })
    }
}

impl Fetch for HttpFetcher {
    async fn get(&self, url: &str, params: Option<&Params>) -> Result<Vec<u8>, FetchError> {
        let request = match params {
            Some(fields) => self.client.post(url).form(fields),
            None => self.client.get(url),
        };
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// A fetched page: the text that parsed, and its DOM.
pub struct Page {
    pub source: String,
    pub html: Html,
}

/// The source site serves windows-1255.
pub fn decode(bytes: &[u8]) -> String {
    let (text, _, had_errors) = encoding_rs::WINDOWS_1255.decode(bytes);
    if had_errors {
        debug!("Replaced undecodable bytes while decoding page");
    }
    text.into_owned()
}

/// Parse markup, retrying once with comments, scripts and `<!...>`
/// declarations cut out. A parse is rejected when nothing but text made it
/// into `<body>`, which is what an unterminated comment does to a page.
pub fn parse_markup(text: &str) -> Option<Page> {
    if let Some(page) = try_parse(text) {
        return Some(page);
    }
    debug!("Page did not parse cleanly, stripping suspicious markup");
    let stripped = COMMENT_RE.replace_all(text, " ");
    let stripped = SCRIPT_RE.replace_all(&stripped, " ");
    let stripped = DECL_RE.replace_all(&stripped, " ");
    try_parse(&stripped)
}

fn try_parse(text: &str) -> Option<Page> {
    let html = Html::parse_document(text);
    let has_elements = html
        .select(&BODY)
        .next()
        .is_some_and(|body| body.children().any(|c| c.value().is_element()));
    has_elements.then(|| Page {
        source: text.to_string(),
        html,
    })
}

/// Fetch, decode and parse a page. Failures are logged and alerted;
/// `None` tells the caller to stop paginating.
pub async fn fetch_page<F: Fetch>(
    fetcher: &F,
    notifier: &dyn Notify,
    url: &str,
    params: Option<&Params>,
) -> Option<Page> {
    debug!(url, ?params, "get_page");
    let bytes = match fetcher.get(url, params).await {
        Ok(b) => b,
        Err(e) => {
            error!("Can't open URL {}: {}", url, e);
            notifier.notify("fetch", "failed to open url", json!({ "url": url, "params": params }));
            return None;
        }
    };
    let text = decode(&bytes);
    match parse_markup(&text) {
        Some(page) => Some(page),
        None => {
            error!("Error parsing URL {}", url);
            notifier.notify("fetch", "failed to parse url", json!({ "url": url, "params": params }));
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    /// Serves canned responses keyed by URL plus form fields; counts calls.
    /// Anything not registered answers 404.
    #[derive(Default)]
    pub struct Canned {
        responses: HashMap<String, Vec<u8>>,
        pub calls: RefCell<Vec<String>>,
    }

    pub fn key(url: &str, params: Option<&Params>) -> String {
        match params {
            None => url.to_string(),
            Some(fields) => {
                let q: Vec<String> = fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                format!("{}#{}", url, q.join("&"))
            }
        }
    }

    impl Canned {
        /// Register an HTML page, encoded the way the source site sends it.
        pub fn page(mut self, url: &str, params: Option<&Params>, html: &str) -> Self {
            let (bytes, _, _) = encoding_rs::WINDOWS_1255.encode(html);
            self.responses.insert(key(url, params), bytes.into_owned());
            self
        }

        pub fn bytes(mut self, url: &str, body: &[u8]) -> Self {
            self.responses.insert(url.to_string(), body.to_vec());
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl Fetch for Canned {
        async fn get(&self, url: &str, params: Option<&Params>) -> Result<Vec<u8>, FetchError> {
            let k = key(url, params);
            self.calls.borrow_mut().push(k.clone());
            self.responses
                .get(&k)
                .cloned()
                .ok_or(FetchError::Status(404))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Canned;
    use super::*;
    use crate::alert::testing::Recorder;

    #[test]
    fn decodes_windows_1255() {
        // "חוק" in windows-1255
        assert_eq!(decode(&[0xE7, 0xE5, 0xF7]), "חוק");
    }

    #[test]
    fn well_formed_page_parses_first_time() {
        let page = parse_markup("<html><body><table><tr><td>1</td></tr></table></body></html>").unwrap();
        assert!(page.source.contains("<table>"));
    }

    #[test]
    fn unterminated_comment_is_stripped_on_retry() {
        let html = "<html><body><!-- broken <p>x</p><table><tr><td>1</td></tr></table></body></html>";
        let page = parse_markup(html).unwrap();
        assert!(!page.source.contains("<!--"));
        let td = Selector::parse("td").unwrap();
        assert_eq!(page.html.select(&td).count(), 1);
    }

    #[test]
    fn text_only_page_is_rejected() {
        assert!(parse_markup("just some text").is_none());
    }

    #[tokio::test]
    async fn error_status_alerts_and_returns_none() {
        let fetcher = Canned::default();
        let err = fetcher.get("http://nowhere", None).await.unwrap_err();
        assert!(matches!(err, FetchError::Status(404)));
        assert_eq!(err.to_string(), "HTTP status 404");

        let alerts = Recorder::default();
        let page = fetch_page(&fetcher, &alerts, "http://nowhere", None).await;
        assert!(page.is_none());
        assert_eq!(alerts.messages(), vec!["failed to open url"]);
    }

    #[tokio::test]
    async fn unparseable_page_alerts_and_returns_none() {
        let fetcher = Canned::default().page("http://x", None, "plain text, no markup");
        let alerts = Recorder::default();
        assert!(fetch_page(&fetcher, &alerts, "http://x", None).await.is_none());
        assert_eq!(alerts.messages(), vec!["failed to parse url"]);
    }

    #[tokio::test]
    async fn post_params_select_the_response() {
        let params = vec![("RowStart".to_string(), "20".to_string())];
        let fetcher = Canned::default()
            .page("http://x", None, "<html><body><p>first</p></body></html>")
            .page("http://x", Some(&params), "<html><body><p>second</p></body></html>");
        let alerts = Recorder::default();
        let page = fetch_page(&fetcher, &alerts, "http://x", Some(&params)).await.unwrap();
        assert!(page.source.contains("second"));
    }
}
