//! Mock DevTools endpoint for integration testing
//!
//! Serves `/json/version`, `/json/list` and a CDP websocket that behaves
//! like a small desktop application with three windows. Clicking buttons in
//! the main window opens a notification, shows the cpu window or exits the
//! process, each after a short delay.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use winprobe::actions::click_expression;

const BASE: &str = "http://demoappdirectory.openf.in/desktop/config/apps/OpenFin/HelloOpenFin";
const RUNTIME_VERSION: &str = "21.93.63.4";
const CONTEXT_ID: &str = "5C2A1F0E9B7D4E3A";
const MAIN_ID: &str = "main-window";
const CPU_ID: &str = "cpu-window";

const VERSION_EXPR: &str = "fin.System.getVersion()";
const SHOWING_EXPR: &str = "fin.Window.getCurrentSync().isShowing()";

const NOTIFICATION_DELAY: Duration = Duration::from_millis(400);
const CPU_SHOW_DELAY: Duration = Duration::from_millis(300);
const EXIT_DELAY: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "mock_devtools")]
struct Args {
    /// Port to listen on; 0 picks a free one
    #[arg(long, default_value = "0")]
    port: u16,
}

struct Window {
    id: String,
    target_type: &'static str,
    url: String,
    title: String,
    showing: bool,
}

impl Window {
    fn new(id: &str, target_type: &'static str, path: &str, title: &str, showing: bool) -> Self {
        Self {
            id: id.to_string(),
            target_type,
            url: format!("{}/{}", BASE, path),
            title: title.to_string(),
            showing,
        }
    }

    fn info(&self, attached: bool) -> Value {
        json!({
            "targetId": self.id,
            "type": self.target_type,
            "title": self.title,
            "url": self.url,
            "attached": attached,
            "browserContextId": CONTEXT_ID,
        })
    }
}

struct MockState {
    windows: Vec<Window>,
    /// session id -> target id
    sessions: HashMap<String, String>,
    next_session: u64,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            windows: vec![
                Window::new(MAIN_ID, "page", "index.html", "Hello OpenFin", true),
                Window::new(CPU_ID, "page", "views/cpu.html", "CPU Info", false),
                Window::new("interapp-window", "page", "views/interappbus.html", "InterApp Bus", false),
                Window::new("service-worker", "service_worker", "sw.js", "Service Worker", false),
            ],
            sessions: HashMap::new(),
            next_session: 1,
        }
    }
}

type Shared = Arc<Mutex<MockState>>;
type Reply = Result<Value, (i64, String)>;

impl MockState {
    fn target_infos(&self) -> Value {
        let infos: Vec<Value> = self
            .windows
            .iter()
            .map(|w| w.info(self.sessions.values().any(|t| *t == w.id)))
            .collect();
        json!({ "targetInfos": infos })
    }

    fn list(&self, port: u16) -> Value {
        let entries: Vec<Value> = self
            .windows
            .iter()
            .map(|w| {
                json!({
                    "id": w.id,
                    "type": w.target_type,
                    "title": w.title,
                    "url": w.url,
                    "webSocketDebuggerUrl": format!("ws://127.0.0.1:{}/devtools/page/{}", port, w.id),
                })
            })
            .collect();
        Value::Array(entries)
    }

    fn attach(&mut self, target_id: &str) -> Reply {
        if !self.windows.iter().any(|w| w.id == target_id) {
            return Err((-32602, "No target with given id found".to_string()));
        }
        let session_id = format!("SESSION-{}", self.next_session);
        self.next_session += 1;
        self.sessions
            .insert(session_id.clone(), target_id.to_string());
        Ok(json!({ "sessionId": session_id }))
    }

    fn window_for(&self, session: Option<&str>) -> Option<&Window> {
        let target_id = self.sessions.get(session?)?;
        self.windows.iter().find(|w| w.id == *target_id)
    }
}

/// Handler state shared by all routes
#[derive(Clone)]
struct AppState {
    mock: Shared,
    port: u16,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let listener = TcpListener::bind(("127.0.0.1", args.port)).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    println!("DevTools listening on {}", browser_ws_url(port));
    std::io::stdout().flush().ok();

    let state = AppState {
        mock: Arc::new(Mutex::new(MockState::default())),
        port,
    };

    let app = Router::new()
        .route("/json/version", get(version))
        .route("/json", get(list))
        .route("/json/list", get(list))
        .route("/devtools/browser/:id", get(upgrade))
        .with_state(state);

    axum::serve(listener, app).await.ok();
}

fn browser_ws_url(port: u16) -> String {
    format!("ws://127.0.0.1:{}/devtools/browser/mock", port)
}

async fn version(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "Browser": format!("OpenFin/{}", RUNTIME_VERSION),
        "Protocol-Version": "1.3",
        "webSocketDebuggerUrl": browser_ws_url(state.port),
    }))
}

async fn list(State(state): State<AppState>) -> Json<Value> {
    Json(state.mock.lock().unwrap().list(state.port))
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_websocket(socket, state.mock))
}

async fn serve_websocket(mut socket: WebSocket, state: Shared) {
    while let Some(message) = socket.recv().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let request: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let reply = handle_request(&state, &request);
        if socket.send(Message::Text(reply.to_string())).await.is_err() {
            break;
        }
    }
}

fn handle_request(state: &Shared, request: &Value) -> Value {
    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or("");
    let params = &request["params"];
    let session = request.get("sessionId").and_then(Value::as_str);

    let outcome = match method {
        "Target.getTargets" => Ok(state.lock().unwrap().target_infos()),
        "Target.attachToTarget" => state
            .lock()
            .unwrap()
            .attach(params["targetId"].as_str().unwrap_or("")),
        "Runtime.evaluate" => evaluate(state, session, params["expression"].as_str().unwrap_or("")),
        other => Err((-32601, format!("'{}' wasn't found", other))),
    };

    let mut reply = match outcome {
        Ok(result) => json!({ "id": id, "result": result }),
        Err((code, message)) => json!({ "id": id, "error": { "code": code, "message": message } }),
    };
    if let Some(session) = session {
        reply["sessionId"] = json!(session);
    }
    reply
}

fn evaluate(state: &Shared, session: Option<&str>, expression: &str) -> Reply {
    let guard = state.lock().unwrap();
    let window = guard
        .window_for(session)
        .ok_or((-32001, "Session with given id not found.".to_string()))?;

    if expression == VERSION_EXPR {
        return Ok(value(json!(RUNTIME_VERSION)));
    }
    if expression == SHOWING_EXPR {
        return Ok(value(json!(window.showing)));
    }

    if window.id == MAIN_ID {
        if expression == click_expression("#desktop-notification") {
            after(state, NOTIFICATION_DELAY, |s| {
                if !s.windows.iter().any(|w| w.id == "notification-window") {
                    s.windows.push(Window::new(
                        "notification-window",
                        "page",
                        "views/notification.html",
                        "Notification",
                        true,
                    ));
                }
            });
            return Ok(value(json!(true)));
        }
        if expression == click_expression("#cpu-info") {
            after(state, CPU_SHOW_DELAY, |s| {
                if let Some(cpu) = s.windows.iter_mut().find(|w| w.id == CPU_ID) {
                    cpu.showing = true;
                }
            });
            return Ok(value(json!(true)));
        }
        if expression == click_expression("#close-app") {
            tokio::spawn(async {
                tokio::time::sleep(EXIT_DELAY).await;
                std::process::exit(0);
            });
            return Ok(value(json!(true)));
        }
    }

    if expression.starts_with("(() => { const el = document.querySelector(") {
        return Ok(exception("Error: no element matches selector"));
    }
    Ok(exception(&format!("ReferenceError: {} is not defined", expression)))
}

/// Apply `change` to the state once `delay` has passed
fn after(state: &Shared, delay: Duration, change: impl FnOnce(&mut MockState) + Send + 'static) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        change(&mut state.lock().unwrap());
    });
}

fn value(v: Value) -> Value {
    let object_type = match &v {
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Null => "undefined",
        _ => "object",
    };
    json!({ "result": { "type": object_type, "value": v } })
}

fn exception(description: &str) -> Value {
    let error = json!({ "type": "object", "subtype": "error", "description": description });
    json!({
        "result": error,
        "exceptionDetails": {
            "exceptionId": 1,
            "text": "Uncaught",
            "lineNumber": 0,
            "columnNumber": 0,
            "exception": error,
        }
    })
}
