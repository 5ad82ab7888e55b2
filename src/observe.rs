use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::browser::PageDriver;
use crate::types::Observation;

/// Snapshot the current page state for the white agent.
///
/// Element collection failures degrade to an empty summary and screenshot
/// failures to a missing path; the observation itself always succeeds so a
/// flaky page never stalls the loop.
pub async fn build_observation(
    driver: &dyn PageDriver,
    cap: usize,
    screenshot_target: Option<&Path>,
) -> Observation {
    let url = driver.url().await;
    let title = driver.title().await;

    let dom_summary = match driver.elements(cap).await {
        Ok(elements) => elements,
        Err(e) => {
            warn!(error = %e, "element collection failed; observing with empty dom summary");
            Vec::new()
        }
    };

    let screenshot_path = match screenshot_target {
        Some(path) => save_screenshot(driver, path).await,
        None => None,
    };

    Observation {
        url,
        title,
        dom_summary,
        screenshot_path,
    }
}

async fn save_screenshot(driver: &dyn PageDriver, path: &Path) -> Option<String> {
    match driver.screenshot_png().await {
        Ok(bytes) => match std::fs::write(path, bytes) {
            Ok(()) => Some(path.to_string_lossy().into_owned()),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to save screenshot");
                None
            }
        },
        Err(e) => {
            warn!(error = %e, "screenshot capture failed");
            None
        }
    }
}

#[derive(Serialize)]
struct StableObservation<'a> {
    url: &'a str,
    title: &'a str,
    dom_elements: usize,
}

/// Coarse content fingerprint over (url, title, element count).
///
/// Deliberately not a hash of element content: consecutive identical-looking
/// pages fingerprint the same for tracking and deduplication. This is not an
/// equality check and is never used for judging.
pub fn observation_fingerprint(observation: &Observation) -> String {
    let stable = StableObservation {
        url: &observation.url,
        title: &observation.title,
        dom_elements: observation.dom_summary.len(),
    };
    let encoded = serde_json::to_string(&stable).unwrap_or_default();
    let digest = Sha256::digest(encoded.as_bytes());
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ElementDescriptor;

    fn obs(url: &str, title: &str, elements: usize) -> Observation {
        Observation {
            url: url.into(),
            title: title.into(),
            dom_summary: (0..elements)
                .map(|i| ElementDescriptor {
                    selector: format!("#e{i}"),
                    tag: "a".into(),
                    text: String::new(),
                    kind: "a".into(),
                })
                .collect(),
            screenshot_path: None,
        }
    }

    #[test]
    fn fingerprint_tracks_url_title_and_count_only() {
        let a = obs("http://localhost:8000/", "Shop", 3);
        let mut b = obs("http://localhost:8000/", "Shop", 3);
        // Different element content, same count: hash-equivalent.
        b.dom_summary[0].selector = "#other".into();
        b.screenshot_path = Some("snap.png".into());
        assert_eq!(observation_fingerprint(&a), observation_fingerprint(&b));

        let c = obs("http://localhost:8000/", "Shop", 4);
        assert_ne!(observation_fingerprint(&a), observation_fingerprint(&c));

        let d = obs("http://localhost:8000/cart", "Shop", 3);
        assert_ne!(observation_fingerprint(&a), observation_fingerprint(&d));
    }
}
