//! W3C WebDriver backend — drives chromedriver / geckodriver over HTTP.
//!
//! Site specifics (URLs, selectors) come from [`SiteConfig`]; selectors that
//! start with `/`, `./` or `(` are XPath, everything else is CSS.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use classbook_core::Credentials;
use classbook_core::config::{BrowserConfig, SiteConfig};
use reqwest::Method;
use serde_json::{Value, json};

use crate::driver::{ActionRef, DriverError, DriverResult, PageDriver, SessionFactory, SlotAction, TextScope};

/// W3C element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735ae4d6f6";

/// Alert polling interval.
const DIALOG_POLL: Duration = Duration::from_millis(200);

/// Clickable descendants of an action cell, tried before the cell itself.
const CLICKABLE_XPATH: &str = ".//a | .//button | .//input[@type='button' or @type='submit']";

/// One browser session.
pub struct WebDriverSession {
    client: reqwest::Client,
    /// `{webdriver_url}/session/{id}`
    base: String,
    site: SiteConfig,
    snapshot_dir: PathBuf,
    closed: bool,
}

impl WebDriverSession {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> DriverResult<Value> {
        send(&self.client, method, &self.url(path), body).await
    }

    async fn find(&self, selector: &str) -> DriverResult<String> {
        let (using, value) = locator(selector);
        let result = self
            .command(Method::POST, "/element", Some(json!({ "using": using, "value": value })))
            .await?;
        element_id(&result)
    }

    async fn find_from(&self, parent: &str, selector: &str) -> DriverResult<String> {
        let (using, value) = locator(selector);
        let result = self
            .command(
                Method::POST,
                &format!("/element/{parent}/element"),
                Some(json!({ "using": using, "value": value })),
            )
            .await?;
        element_id(&result)
    }

    async fn click(&self, element: &str) -> DriverResult<()> {
        self.command(Method::POST, &format!("/element/{element}/click"), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn type_into(&self, element: &str, text: &str) -> DriverResult<()> {
        self.command(
            Method::POST,
            &format!("/element/{element}/value"),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn text_of(&self, element: &str) -> DriverResult<String> {
        let value = self
            .command(Method::GET, &format!("/element/{element}/text"), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl PageDriver for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        tracing::debug!("🌐 Navigate {url}");
        self.command(Method::POST, "/url", Some(json!({ "url": url }))).await?;
        Ok(())
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        let value = self.command(Method::GET, "/url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn sign_in(&mut self, credentials: &Credentials) -> DriverResult<()> {
        let user = self.find(&self.site.username_selector).await?;
        self.type_into(&user, &credentials.username).await?;
        let password = self.find(&self.site.password_selector).await?;
        self.type_into(&password, &credentials.password).await?;
        let submit = self.find(&self.site.login_submit_selector).await?;
        self.click(&submit).await
    }

    async fn find_slot_action(&mut self, time_label: &str) -> DriverResult<Option<SlotAction>> {
        let row = match self.find(&self.site.slot_row_xpath_for(time_label)).await {
            Ok(row) => row,
            Err(DriverError::NoSuchElement(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let cell = match self.find_from(&row, &self.site.action_cell_xpath).await {
            Ok(cell) => cell,
            Err(DriverError::NoSuchElement(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let text = self.text_of(&cell).await?;
        Ok(Some(SlotAction {
            handle: ActionRef(cell),
            text,
        }))
    }

    async fn invoke_action(&mut self, action: &ActionRef) -> DriverResult<()> {
        let target = match self.find_from(&action.0, CLICKABLE_XPATH).await {
            Ok(inner) => inner,
            Err(DriverError::NoSuchElement(_)) => action.0.clone(),
            Err(e) => return Err(e),
        };
        self.click(&target).await
    }

    async fn invoke_submit(&mut self) -> DriverResult<bool> {
        match self.find(&self.site.submit_selector).await {
            Ok(submit) => {
                self.click(&submit).await?;
                Ok(true)
            }
            Err(DriverError::NoSuchElement(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn read_text(&mut self, scope: TextScope) -> DriverResult<String> {
        let selector = match scope {
            TextScope::Page => "body".to_string(),
            TextScope::ReservationList => self.site.reservation_list_selector.clone(),
            TextScope::Calendar => self.site.calendar_selector.clone(),
        };
        let element = self.find(&selector).await?;
        self.text_of(&element).await
    }

    async fn snapshot(&mut self, label: &str) -> DriverResult<()> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| DriverError::Decode("screenshot is not a string".into()))?;
        let png = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| DriverError::Decode(e.to_string()))?;
        tokio::fs::create_dir_all(&self.snapshot_dir).await?;
        let stamp = classbook_core::now_kst().format("%Y%m%d-%H%M%S%.3f");
        let path = self.snapshot_dir.join(format!("{stamp}-{label}.png"));
        tokio::fs::write(&path, png).await?;
        tracing::debug!("📸 Snapshot saved: {}", path.display());
        Ok(())
    }

    async fn next_dialog(&mut self, wait: Duration) -> DriverResult<Option<String>> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            match self.command(Method::GET, "/alert/text", None).await {
                Ok(value) => return Ok(Some(value.as_str().unwrap_or_default().to_string())),
                Err(DriverError::NoSuchAlert) => {}
                Err(e) => return Err(e),
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(DIALOG_POLL).await;
        }
    }

    async fn resolve_dialog(&mut self, accept: bool) -> DriverResult<()> {
        let path = if accept { "/alert/accept" } else { "/alert/dismiss" };
        self.command(Method::POST, path, Some(json!({}))).await?;
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.command(Method::DELETE, "", None).await?;
        tracing::debug!("🧹 Browser session closed");
        Ok(())
    }
}

/// Opens a fresh browser session per attempt.
pub struct WebDriverFactory {
    client: reqwest::Client,
    browser: BrowserConfig,
    site: SiteConfig,
    snapshot_dir: PathBuf,
}

impl WebDriverFactory {
    pub fn new(browser: BrowserConfig, site: SiteConfig, snapshot_dir: PathBuf) -> Self {
        Self {
            client: reqwest::Client::new(),
            browser,
            site,
            snapshot_dir,
        }
    }

    /// New-session capabilities. Prompts are left open so the attempt can
    /// read and classify them.
    pub fn capabilities(&self) -> Value {
        let mut args: Vec<String> = vec!["--no-sandbox".into(), "--disable-dev-shm-usage".into()];
        if self.browser.headless {
            args.push("--headless=new".into());
        }
        if self.browser.block_images {
            args.push("--blink-settings=imagesEnabled=false".into());
        }
        args.extend(self.browser.extra_args.iter().cloned());

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": self.browser.browser_name,
                    "unhandledPromptBehavior": "ignore",
                    "pageLoadStrategy": "normal",
                    "goog:chromeOptions": { "args": args },
                }
            }
        })
    }
}

#[async_trait]
impl SessionFactory for WebDriverFactory {
    async fn open(&self) -> DriverResult<Box<dyn PageDriver>> {
        let endpoint = format!("{}/session", self.browser.webdriver_url.trim_end_matches('/'));
        let value = send(&self.client, Method::POST, &endpoint, Some(self.capabilities())).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Session(format!("no sessionId in response: {value}")))?;

        let session = WebDriverSession {
            client: self.client.clone(),
            base: format!("{endpoint}/{session_id}"),
            site: self.site.clone(),
            snapshot_dir: self.snapshot_dir.clone(),
            closed: false,
        };
        let page_load_ms = self.browser.page_timeout_secs * 1000;
        if let Err(e) = session
            .command(Method::POST, "/timeouts", Some(json!({ "pageLoad": page_load_ms })))
            .await
        {
            tracing::warn!("⚠️ Could not set page load timeout: {e}");
        }
        tracing::debug!("🧭 Browser session {session_id} opened");
        Ok(Box::new(session))
    }
}

/// Send one WebDriver command and unwrap its `value`.
async fn send(client: &reqwest::Client, method: Method, url: &str, body: Option<Value>) -> DriverResult<Value> {
    let mut request = client.request(method, url).timeout(Duration::from_secs(60));
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let status = response.status();
    let payload: Value = response.json().await?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);
    if status.is_success() {
        Ok(value)
    } else {
        Err(protocol_error(&value))
    }
}

fn protocol_error(value: &Value) -> DriverError {
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match error.as_str() {
        "no such element" | "stale element reference" => DriverError::NoSuchElement(message),
        "no such alert" => DriverError::NoSuchAlert,
        "invalid session id" | "session not created" => DriverError::Session(message),
        _ => DriverError::Protocol { error, message },
    }
}

/// `(strategy, value)` for a selector string.
fn locator(selector: &str) -> (&'static str, &str) {
    let trimmed = selector.trim();
    if trimmed.starts_with('/') || trimmed.starts_with("./") || trimmed.starts_with('(') {
        ("xpath", trimmed)
    } else {
        ("css selector", trimmed)
    }
}

fn element_id(value: &Value) -> DriverResult<String> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DriverError::Decode(format!("not an element reference: {value}")))
}
