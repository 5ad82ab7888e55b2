use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::debug;

use crate::dom;
use crate::types::ElementDescriptor;

/// Settle time after a click before the next observation, giving scripted
/// pages a chance to react.
const CLICK_SETTLE: Duration = Duration::from_millis(500);

/// Boundary to the underlying browser session. One driver per run; the run
/// owns it exclusively and drops it on every exit path.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;
    /// Current URL. Infallible by contract: implementations report "unknown"
    /// when the page cannot be asked.
    async fn url(&self) -> String;
    async fn title(&self) -> String;
    async fn html(&self) -> Result<String>;
    async fn screenshot_png(&self) -> Result<Vec<u8>>;
    async fn elements(&self, cap: usize) -> Result<Vec<ElementDescriptor>>;
    async fn click(&self, selector: &str, timeout: Duration) -> Result<()>;
    async fn fill(&self, selector: &str, text: &str, timeout: Duration) -> Result<()>;
    async fn press_enter(&self, selector: &str, timeout: Duration) -> Result<()>;
    async fn select_value(&self, selector: &str, value: &str, timeout: Duration) -> Result<()>;
    async fn scroll_by(&self, delta_y: i64) -> Result<()>;
    async fn text_content(&self, selector: &str, timeout: Duration) -> Result<Option<String>>;
    async fn count_matches(&self, selector: &str) -> Result<usize>;
}

/// Isolated headless-Chrome session. Launching creates a dedicated browser
/// process; dropping the session tears it down.
pub struct ChromeSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeSession {
    pub async fn launch() -> Result<Self> {
        tokio::task::spawn_blocking(Self::launch_blocking)
            .await
            .map_err(|e| anyhow!("browser launch panicked: {e}"))?
    }

    fn launch_blocking() -> Result<Self> {
        let args = vec![
            std::ffi::OsStr::new("--no-first-run"),
            std::ffi::OsStr::new("--no-default-browser-check"),
            std::ffi::OsStr::new("--disable-dev-shm-usage"),
            std::ffi::OsStr::new("--disable-gpu"),
        ];
        let options = LaunchOptions {
            headless: true,
            sandbox: false,
            window_size: Some((1280, 720)),
            args,
            idle_browser_timeout: Duration::from_secs(300),
            ..Default::default()
        };

        let browser = Browser::new(options).context("failed to launch Chrome")?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;
        debug!("chrome session ready");

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    /// Run a closure against the tab on the blocking pool. headless_chrome is
    /// synchronous; keeping its calls off the async runtime threads.
    async fn with_tab<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Tab>) -> Result<T> + Send + 'static,
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || f(tab))
            .await
            .map_err(|e| anyhow!("browser task panicked: {e}"))?
    }
}

#[async_trait]
impl PageDriver for ChromeSession {
    async fn goto(&self, url: &str) -> Result<()> {
        let url = url.to_string();
        self.with_tab(move |tab| {
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn url(&self) -> String {
        self.with_tab(|tab| dom::get_current_url(&tab))
            .await
            .unwrap_or_else(|_| "unknown".to_string())
    }

    async fn title(&self) -> String {
        self.with_tab(|tab| dom::get_page_title(&tab))
            .await
            .unwrap_or_default()
    }

    async fn html(&self) -> Result<String> {
        self.with_tab(|tab| Ok(tab.get_content()?)).await
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        self.with_tab(|tab| {
            Ok(tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)?)
        })
        .await
    }

    async fn elements(&self, cap: usize) -> Result<Vec<ElementDescriptor>> {
        self.with_tab(move |tab| dom::collect_interactive_elements(&tab, cap))
            .await
    }

    async fn click(&self, selector: &str, timeout: Duration) -> Result<()> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            tab.wait_for_element_with_custom_timeout(&selector, timeout)?
                .click()?;
            std::thread::sleep(CLICK_SETTLE);
            Ok(())
        })
        .await
    }

    async fn fill(&self, selector: &str, text: &str, timeout: Duration) -> Result<()> {
        let selector = selector.to_string();
        let text = text.to_string();
        self.with_tab(move |tab| {
            let el = tab.wait_for_element_with_custom_timeout(&selector, timeout)?;
            el.click()?;
            tab.evaluate(
                &format!(
                    "document.querySelector('{}').value = ''",
                    dom::js_quote(&selector)
                ),
                false,
            )?;
            tab.type_str(&text)?;
            Ok(())
        })
        .await
    }

    async fn press_enter(&self, selector: &str, timeout: Duration) -> Result<()> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            tab.wait_for_element_with_custom_timeout(&selector, timeout)?;
            tab.press_key("Enter")?;
            Ok(())
        })
        .await
    }

    async fn select_value(&self, selector: &str, value: &str, timeout: Duration) -> Result<()> {
        let selector = selector.to_string();
        let value = value.to_string();
        self.with_tab(move |tab| {
            tab.wait_for_element_with_custom_timeout(&selector, timeout)?;
            tab.evaluate(
                &format!(
                    "(() => {{ const el = document.querySelector('{}'); el.value = '{}'; \
                     el.dispatchEvent(new Event('input', {{bubbles: true}})); \
                     el.dispatchEvent(new Event('change', {{bubbles: true}})); }})()",
                    dom::js_quote(&selector),
                    dom::js_quote(&value)
                ),
                false,
            )?;
            Ok(())
        })
        .await
    }

    async fn scroll_by(&self, delta_y: i64) -> Result<()> {
        self.with_tab(move |tab| {
            tab.evaluate(&format!("window.scrollBy(0, {delta_y})"), false)?;
            Ok(())
        })
        .await
    }

    async fn text_content(&self, selector: &str, timeout: Duration) -> Result<Option<String>> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            if tab
                .wait_for_element_with_custom_timeout(&selector, timeout)
                .is_err()
            {
                return Ok(None);
            }
            dom::inner_text(&tab, &selector)
        })
        .await
    }

    async fn count_matches(&self, selector: &str) -> Result<usize> {
        let selector = selector.to_string();
        self.with_tab(move |tab| dom::count_matches(&tab, &selector))
            .await
    }
}
