use std::time::Duration;

use crate::browser::PageDriver;
use crate::types::{ACTION_TIMEOUT_MS, Action, ExecutionResult};

/// Applies validated actions to a live page.
///
/// Execution failures never escape: every outcome, including timeouts and
/// session errors, is reported inline in the returned `ExecutionResult`.
pub struct ActionExecutor {
    default_timeout: Duration,
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(ACTION_TIMEOUT_MS),
        }
    }
}

impl ActionExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub async fn execute(&self, driver: &dyn PageDriver, action: &Action) -> ExecutionResult {
        let outcome = match action {
            Action::Click { selector } => driver.click(selector, self.default_timeout).await,
            Action::Type {
                selector,
                text,
                press_enter,
            } => {
                let mut res = driver.fill(selector, text, self.default_timeout).await;
                if res.is_ok() && *press_enter {
                    res = driver.press_enter(selector, self.default_timeout).await;
                }
                res
            }
            Action::Select { selector, value } => {
                driver
                    .select_value(selector, value, self.default_timeout)
                    .await
            }
            Action::Scroll { delta_y } => driver.scroll_by(*delta_y).await,
            Action::Wait { ms } => {
                // The one action that deliberately blocks without touching
                // the page.
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
            Action::Stop { reason } => {
                return ExecutionResult {
                    success: true,
                    error: None,
                    url: driver.url().await,
                    stop_reason: Some(reason.clone()),
                };
            }
        };

        let url = driver.url().await;
        match outcome {
            Ok(()) => ExecutionResult {
                success: true,
                error: None,
                url,
                stop_reason: None,
            },
            Err(e) => ExecutionResult {
                success: false,
                error: Some(format!("Error executing {}: {e:#}", action.kind())),
                url,
                stop_reason: None,
            },
        }
    }
}
