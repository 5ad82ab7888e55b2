//! Deterministic outcome judging and gold-trace scoring.
//!
//! Selector existence is a text heuristic over the raw markup, not a DOM
//! query. The heuristic (and its false-positive risk) is load-bearing:
//! existing judged tasks depend on its exact behavior, so it must not be
//! upgraded to a real selector engine.

use regex::Regex;
use url::Url;

use crate::types::{
    Action, GoldAction, ScriptedRunResult, TaskEvidence, TaskMetrics, TaskSpec,
};

/// Scroll deltas within this many pixels of the gold value count as a match.
const SCROLL_MATCH_TOLERANCE: i64 = 100;

/// Judge whether a run completed its task, from the final page state alone.
///
/// Precedence: declarative `success_criteria` when present (all present keys
/// must pass; an empty map never passes), otherwise the legacy css/regex
/// pair, otherwise false. In this path the legacy regex is applied to the
/// final markup, since no extracted answer text exists after a free-form run.
pub fn judge_final_success(task: &TaskSpec, final_html: &str, final_url: &str) -> bool {
    if let Some(criteria) = &task.success_criteria {
        if criteria.is_empty() {
            return false;
        }
        if let Some(fragment) = &criteria.url_contains {
            if !final_url.contains(fragment) {
                return false;
            }
        }
        if let Some(pattern) = &criteria.text_present {
            if !regex_matches(pattern, final_html) {
                return false;
            }
        }
        if let Some(selector) = &criteria.selector_present {
            if !css_selector_exists(selector, final_html) {
                return false;
            }
        }
        return true;
    }

    if let Some(expected) = &task.expected {
        return css_selector_exists(&expected.css, final_html)
            && regex_matches(&expected.regex, final_html)
            && domains_match(&task.start_url, final_url);
    }

    false
}

/// Legacy judging for the single-task endpoint: selector existence in the
/// final markup, regex over the extracted answer text, and a same-domain
/// check on the final URL.
pub fn judge_outcome(
    task: &TaskSpec,
    result: &ScriptedRunResult,
    final_html: &str,
) -> (bool, TaskMetrics, TaskEvidence) {
    let (css_ok, regex_ok) = match &task.expected {
        Some(expected) => (
            css_selector_exists(&expected.css, final_html),
            regex_matches(&expected.regex, &result.answer_text),
        ),
        None => (false, false),
    };
    let on_task_domain = domains_match(&task.start_url, &result.final_url);

    let success = css_ok && regex_ok && on_task_domain;

    let metrics = TaskMetrics {
        duration_sec: result.duration_sec,
        step_count: result.actions.len(),
        on_task_domain,
    };

    let evidence = TaskEvidence {
        matched_text: regex_ok.then(|| result.answer_text.clone()),
        final_url: result.final_url.clone(),
        screenshot: String::new(), // filled in once the snapshot is saved
    };

    (success, metrics, evidence)
}

/// Heuristic check that a CSS selector would match somewhere in the markup.
///
/// ID selectors look for a literal `id="..."` attribute; compound
/// `#id .class` selectors additionally require a `class="..."` attribute
/// containing the class token; bare class selectors use the class-attribute
/// regex; anything else falls back to a raw substring test.
pub fn css_selector_exists(css_selector: &str, html: &str) -> bool {
    if let Some(id_part) = css_selector.strip_prefix('#') {
        if id_part.contains('.') {
            let (element_id, class_part) = match id_part.split_once(' ') {
                Some((id, rest)) => (id, rest),
                None => (id_part, ""),
            };
            let id_marker = format!("id=\"{element_id}\"");
            if let Some(class_name) = class_part.strip_prefix('.') {
                return html.contains(&id_marker) && class_attribute_matches(class_name, html);
            }
            return html.contains(&id_marker);
        }
        return html.contains(&format!("id=\"{id_part}\""));
    }

    if let Some(class_name) = css_selector.strip_prefix('.') {
        return class_attribute_matches(class_name, html);
    }

    html.contains(css_selector)
}

fn class_attribute_matches(class_name: &str, html: &str) -> bool {
    match Regex::new(&format!("class=\"[^\"]*{class_name}[^\"]*\"")) {
        Ok(re) => re.is_match(html),
        Err(_) => false,
    }
}

/// Regex search that never fails: an invalid pattern simply does not match.
pub fn regex_matches(pattern: &str, text: &str) -> bool {
    match Regex::new(pattern) {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

/// Same-domain check between start and final URLs. localhost and 127.0.0.1
/// are interchangeable; everything else compares host:port exactly.
pub fn domains_match(start_url: &str, final_url: &str) -> bool {
    let (Some(start), Some(fin)) = (netloc(start_url), netloc(final_url)) else {
        return false;
    };

    if start.contains("localhost") || start.contains("127.0.0.1") {
        return fin.contains("localhost") || fin.contains("127.0.0.1");
    }

    start == fin
}

fn netloc(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Score how closely an executed action sequence matches a gold sequence.
///
/// Strict positional comparison: each gold step (by its explicit `step`
/// index, or its position) is compared against the executed action at the
/// same index. Reordered matches are never credited. Returns 0.0 when
/// either sequence is empty; otherwise `matches / gold.len()` in [0, 1].
pub fn compute_trace_match(executed: &[Action], gold: &[GoldAction]) -> f64 {
    if executed.is_empty() || gold.is_empty() {
        return 0.0;
    }

    let mut matches = 0usize;
    for (position, gold_action) in gold.iter().enumerate() {
        let idx = gold_action.step.unwrap_or(position);
        if let Some(candidate) = executed.get(idx) {
            if action_matches_gold(candidate, gold_action) {
                matches += 1;
            }
        }
    }

    matches as f64 / gold.len() as f64
}

fn action_matches_gold(executed: &Action, gold: &GoldAction) -> bool {
    if executed.kind() != gold.kind {
        return false;
    }

    if let Action::Scroll { delta_y } = executed {
        let gold_delta = gold.delta_y.unwrap_or(0);
        return (delta_y - gold_delta).abs() <= SCROLL_MATCH_TOLERANCE;
    }

    rough_selector_match(
        executed.selector().unwrap_or_default(),
        gold.selector.as_deref().unwrap_or_default(),
    )
}

/// Exact equality, whitespace-stripped equality, or either selector being a
/// substring of the other.
fn rough_selector_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let strip = |s: &str| s.split_whitespace().collect::<String>();
    if strip(a) == strip(b) {
        return true;
    }
    a.contains(b) || b.contains(a)
}
