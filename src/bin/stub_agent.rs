//! Deterministic white agent for local testing and demos.
//!
//! Strategy: click the first button or link on the opening step, prefer
//! price-looking elements when the instruction mentions prices or products,
//! scroll for a few steps, then stop.

use anyhow::Result;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use navbench::types::{ActRequest, ActResponse, HealthResponse};

#[derive(Parser)]
#[command(name = "stub-agent", version, about = "Scripted white agent for navbench")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 9000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let app = Router::new()
        .route("/act", post(act_handler))
        .route("/health", get(health_handler));

    let listener = TcpListener::bind((cli.host.as_str(), cli.port)).await?;
    info!(addr = %listener.local_addr()?, "stub agent listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

async fn act_handler(Json(request): Json<ActRequest>) -> Json<ActResponse> {
    Json(decide(&request))
}

fn decide(request: &ActRequest) -> ActResponse {
    let elements = &request.observation.dom_summary;

    // Opening move: click the first button or link in view.
    if request.step_idx == 0 {
        for element in elements.iter().take(10) {
            if (element.tag == "button" || element.tag == "a") && !element.selector.is_empty() {
                return respond(
                    json!({"type": "click", "selector": element.selector, "confidence": 0.8}),
                    format!("Clicking {} with selector {}", element.tag, element.selector),
                    "first_clickable",
                );
            }
        }
    }

    let instruction = request.instruction.to_lowercase();
    if instruction.contains("price") || instruction.contains("product") {
        for element in elements {
            let text = element.text.to_lowercase();
            if (text.contains("price") || text.contains('$')) && !element.selector.is_empty() {
                return respond(
                    json!({"type": "click", "selector": element.selector, "confidence": 0.9}),
                    format!("Found price element: {}", element.text),
                    "price_match",
                );
            }
        }
    }

    if request.step_idx < 3 {
        return respond(
            json!({"type": "scroll", "delta_y": 500}),
            "Scrolling to see more content".to_string(),
            "scroll",
        );
    }

    respond(
        json!({"type": "stop", "reason": "done"}),
        "Task completed".to_string(),
        "stop",
    )
}

fn respond(action: Value, thoughts: String, strategy: &str) -> ActResponse {
    ActResponse {
        action,
        thoughts: Some(thoughts),
        info: Some(json!({"strategy": strategy})),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navbench::types::{ActionSpace, ElementDescriptor, Observation};

    fn request(step_idx: u32, instruction: &str, elements: Vec<ElementDescriptor>) -> ActRequest {
        ActRequest {
            run_id: "r1".into(),
            task_id: "t1".into(),
            instruction: instruction.into(),
            step_idx,
            observation: Observation {
                url: "http://localhost:8000/".into(),
                title: "Shop".into(),
                dom_summary: elements,
                screenshot_path: None,
            },
            action_space: ActionSpace::default(),
        }
    }

    fn link(selector: &str, text: &str) -> ElementDescriptor {
        ElementDescriptor {
            selector: selector.into(),
            tag: "a".into(),
            text: text.into(),
            kind: "a".into(),
        }
    }

    #[test]
    fn clicks_first_link_on_opening_step() {
        let response = decide(&request(0, "Browse", vec![link("#go", "Go")]));
        assert_eq!(response.action["type"], "click");
        assert_eq!(response.action["selector"], "#go");
    }

    #[test]
    fn prefers_price_elements_for_price_instructions() {
        let response = decide(&request(
            1,
            "Find the price of product 3",
            vec![link("#nav", "Nav"), link("#product-3", "$29.99")],
        ));
        assert_eq!(response.action["selector"], "#product-3");
    }

    #[test]
    fn scrolls_then_stops() {
        let scroll = decide(&request(2, "Browse", vec![]));
        assert_eq!(scroll.action["type"], "scroll");

        let stop = decide(&request(3, "Browse", vec![]));
        assert_eq!(stop.action["type"], "stop");
        assert_eq!(stop.action["reason"], "done");
    }
}
