use std::sync::Arc;

use anyhow::Result;
use headless_chrome::Tab;

use crate::types::{ELEMENT_TEXT_MAX_CHARS, ElementDescriptor};

/// JavaScript injected into the page to list visible interactive elements.
/// NON-DESTRUCTIVE: reads the DOM without modifying it.
///
/// The script:
///   1. Queries a fixed set of interactive selectors (links, buttons, text
///      inputs, selects, ARIA roles, test ids, anything with an id).
///   2. Skips elements with zero width AND zero height.
///   3. Picks one locator per element: #id, then up to two classes, then the
///      bare tag name.
///   4. Returns a JSON array of {selector, tag, text, type}.
///
/// `__MAX__` and `__TEXT_MAX__` are substituted before evaluation.
const ELEMENTS_JS: &str = r#"
(() => {
  const MAX = __MAX__;
  const out = [];
  const selectors = [
    'a[href]',
    'button',
    'input[type="text"]',
    'input[type="email"]',
    'input[type="password"]',
    'input[type="search"]',
    'input[type="number"]',
    'textarea',
    'select',
    '[role="button"]',
    '[role="link"]',
    '[onclick]',
    '[data-testid]',
    '[id]'
  ];

  for (const selector of selectors) {
    const nodes = document.querySelectorAll(selector);
    for (const node of nodes) {
      if (out.length >= MAX) break;

      const rect = node.getBoundingClientRect();
      if (rect.width === 0 && rect.height === 0) continue;

      let css = '';
      if (node.id) {
        css = '#' + node.id;
      } else if (node.className && typeof node.className === 'string') {
        const classes = node.className.split(' ').filter(c => c).slice(0, 2);
        if (classes.length > 0) {
          css = '.' + classes.join('.');
        }
      }
      if (!css) {
        css = node.tagName.toLowerCase();
      }

      const text = (node.textContent || node.value || '').trim().substring(0, __TEXT_MAX__);

      out.push({
        selector: css,
        tag: node.tagName.toLowerCase(),
        text: text,
        type: node.type || node.tagName.toLowerCase()
      });
    }
    if (out.length >= MAX) break;
  }

  return JSON.stringify(out.slice(0, MAX));
})()
"#;

/// Collect up to `cap` visible interactive elements from the current page.
pub fn collect_interactive_elements(tab: &Arc<Tab>, cap: usize) -> Result<Vec<ElementDescriptor>> {
    let js = ELEMENTS_JS
        .replace("__MAX__", &cap.to_string())
        .replace("__TEXT_MAX__", &ELEMENT_TEXT_MAX_CHARS.to_string());
    let result = tab.evaluate(&js, false)?;
    let raw = result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "[]".to_string());
    Ok(serde_json::from_str(&raw)?)
}

/// Get the current page URL.
pub fn get_current_url(tab: &Arc<Tab>) -> Result<String> {
    let result = tab.evaluate("window.location.href", false)?;
    Ok(result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "unknown".to_string()))
}

/// Get the current page title.
pub fn get_page_title(tab: &Arc<Tab>) -> Result<String> {
    let result = tab.evaluate("document.title", false)?;
    Ok(result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default())
}

/// Inner text of the first element matching `selector`, or None when the
/// selector matches nothing.
pub fn inner_text(tab: &Arc<Tab>, selector: &str) -> Result<Option<String>> {
    let js = format!(
        "(() => {{ const el = document.querySelector('{}'); return el ? (el.innerText || '') : null; }})()",
        js_quote(selector)
    );
    let result = tab.evaluate(&js, false)?;
    Ok(match result.value {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    })
}

/// Number of elements matching `selector`.
pub fn count_matches(tab: &Arc<Tab>, selector: &str) -> Result<usize> {
    let js = format!(
        "document.querySelectorAll('{}').length",
        js_quote(selector)
    );
    let result = tab.evaluate(&js, false)?;
    Ok(result.value.and_then(|v| v.as_u64()).unwrap_or(0) as usize)
}

/// Escape a selector for embedding in a single-quoted JS string literal.
pub fn js_quote(selector: &str) -> String {
    selector.replace('\\', "\\\\").replace('\'', "\\'")
}
