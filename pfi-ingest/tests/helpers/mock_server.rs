//! In-process stand-in for the profile parse endpoint
//!
//! Serves a scripted sequence of responses on `127.0.0.1:<ephemeral>` and
//! records every request it receives.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    /// Remaining responses; the last one repeats once the others are used
    responses: Mutex<VecDeque<(u16, String)>>,
    auth_headers: Mutex<Vec<String>>,
    bodies: Mutex<Vec<serde_json::Value>>,
    delay: Mutex<Duration>,
}

/// Running mock server
pub struct MockParseServer {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockParseServer {
    /// Start a server answering `POST /v1/profile/parse` with `responses` in order
    pub async fn start(responses: &[(u16, &str)]) -> Self {
        let state = Arc::new(MockState::default());
        *state.responses.lock().unwrap() = responses
            .iter()
            .map(|(status, body)| (*status, body.to_string()))
            .collect();

        let app = Router::new()
            .route("/v1/profile/parse", post(handle_parse))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    /// Delay every response by `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = delay;
    }

    pub fn hits(&self) -> usize {
        self.state.auth_headers.lock().unwrap().len()
    }

    pub fn auth_headers(&self) -> Vec<String> {
        self.state.auth_headers.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<serde_json::Value> {
        self.state.bodies.lock().unwrap().clone()
    }
}

async fn handle_parse(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    state.auth_headers.lock().unwrap().push(auth);
    if let Ok(json) = serde_json::from_str(&body) {
        state.bodies.lock().unwrap().push(json);
    }

    let delay = *state.delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let (status, body) = {
        let mut responses = state.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            responses
                .front()
                .cloned()
                .unwrap_or((500, "no scripted response".to_string()))
        }
    };

    (StatusCode::from_u16(status).unwrap(), body)
}

/// Base URL of a port nothing is listening on
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
