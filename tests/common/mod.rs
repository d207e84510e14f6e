//! In-process mock of the Flair API for integration tests.
//!
//! The server runs on its own thread with a tokio runtime, so tests drive the
//! blocking client from plain `#[test]` functions.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use flair_api::{Client, Config, Credentials};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CLIENT_ID: &str = "client-id";
pub const CLIENT_SECRET: &str = "client-secret";

/// A request as the mock server saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub accept: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

struct MockState {
    routes: Mutex<HashMap<(String, String), (u16, String)>>,
    requests: Mutex<Vec<RecordedRequest>>,
    token_expires_in: Mutex<Option<i64>>,
    delay: Mutex<Option<Duration>>,
}

pub struct MockApi {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl MockApi {
    /// Start a mock API publishing links for structures, rooms and vents
    pub fn start() -> Self {
        init_tracing();

        let state = Arc::new(MockState {
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            token_expires_in: Mutex::new(Some(3600)),
            delay: Mutex::new(None),
        });
        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));

        // Bound before the server thread starts, so early connections queue up
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, app).await.unwrap();
            });
        });

        let api = MockApi { addr, state };
        api.respond("GET", "/api/", 200, root_links());
        api
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn config(&self) -> Config {
        Config::new(self.url()).with_timeout(Duration::from_secs(5))
    }

    /// A client holding the credentials the mock accepts
    pub fn client(&self) -> Client {
        Client::with_config(Credentials::new(CLIENT_ID, CLIENT_SECRET), self.config()).unwrap()
    }

    /// A client holding credentials the mock rejects
    pub fn client_with_bad_secret(&self) -> Client {
        Client::with_config(Credentials::new(CLIENT_ID, "wrong"), self.config()).unwrap()
    }

    pub fn respond(&self, method: &str, path: &str, status: u16, body: Value) {
        self.respond_raw(method, path, status, &body.to_string());
    }

    pub fn respond_raw(&self, method: &str, path: &str, status: u16, body: &str) {
        self.state
            .routes
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body.to_string()));
    }

    /// Lifetime of tokens issued from now on
    pub fn set_token_expires_in(&self, expires_in: Option<i64>) {
        *self.state.token_expires_in.lock().unwrap() = expires_in;
    }

    /// Hold every response back for `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = Some(delay);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests_to(method, path).len()
    }

    pub fn token_requests(&self) -> usize {
        self.count("POST", "/oauth/token")
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };
    let request = RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(String::from),
        authorization: header(AUTHORIZATION),
        content_type: header(CONTENT_TYPE),
        accept: header(ACCEPT),
        body: String::from_utf8_lossy(&body).to_string(),
    };

    let token_count = {
        let mut requests = state.requests.lock().unwrap();
        requests.push(request.clone());
        requests.iter().filter(|r| r.path == "/oauth/token").count()
    };

    let delay = *state.delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let route = state
        .routes
        .lock()
        .unwrap()
        .get(&(request.method.clone(), request.path.clone()))
        .cloned();

    match route {
        Some((status, body)) => json_response(StatusCode::from_u16(status).unwrap(), body),
        None if request.method == "POST" && request.path == "/oauth/token" => {
            issue_token(&request, token_count, *state.token_expires_in.lock().unwrap())
        }
        None => json_response(
            StatusCode::NOT_FOUND,
            json!({"errors": [{"status": "404"}]}).to_string(),
        ),
    }
}

fn issue_token(request: &RecordedRequest, count: usize, expires_in: Option<i64>) -> Response {
    let query = request.query.clone().unwrap_or_default();
    let authorized = query.contains(&format!("client_id={}", CLIENT_ID))
        && query.contains(&format!("client_secret={}", CLIENT_SECRET))
        && query.contains("grant_type=client_credentials");

    if !authorized {
        return json_response(
            StatusCode::UNAUTHORIZED,
            json!({"error": "invalid_client"}).to_string(),
        );
    }

    json_response(
        StatusCode::OK,
        json!({
            "access_token": format!("token-{}", count),
            "token_type": "bearer",
            "expires_in": expires_in,
            "scope": "structures.view vents.view vents.edit"
        })
        .to_string(),
    )
}

fn json_response(status: StatusCode, body: String) -> Response {
    (status, [(CONTENT_TYPE, "application/vnd.api+json")], body).into_response()
}

pub fn root_links() -> Value {
    json!({
        "links": {
            "self": {"href": "/api/"},
            "structures": {"self": "/api/structures", "type": "structures"},
            "rooms": {"self": "/api/rooms", "type": "rooms"},
            "vents": {"self": "/api/vents", "type": "vents"}
        }
    })
}

pub fn vent(id: &str, name: &str, percent_open: i64) -> Value {
    json!({
        "id": id,
        "type": "vents",
        "attributes": {"name": name, "percent_open": percent_open},
        "relationships": {"room": {"data": {"id": "1", "type": "rooms"}}}
    })
}

pub fn vents(items: &[(&str, &str, i64)]) -> Value {
    let data: Vec<Value> = items.iter().map(|(id, name, open)| vent(id, name, *open)).collect();
    json!({ "data": data })
}

pub fn structures(mode: &str) -> Value {
    json!({
        "data": [{
            "id": "1",
            "type": "structures",
            "attributes": {"name": "Home", "mode": mode}
        }]
    })
}
