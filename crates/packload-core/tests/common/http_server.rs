//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves GET from a path → response table that can be changed after the
//! server started (the config body needs the server's own URL). Every
//! response closes the connection.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_encoding: Option<&'static str>,
}

impl Route {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_encoding: None,
        }
    }

    pub fn encoded(body: impl Into<Vec<u8>>, encoding: &'static str) -> Self {
        Self {
            content_encoding: Some(encoding),
            ..Self::ok(body)
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            content_encoding: None,
        }
    }
}

#[derive(Default)]
struct State {
    routes: HashMap<String, Vec<Route>>,
    hits: HashMap<String, u32>,
    accept_encoding: HashMap<String, String>,
}

/// Handle to a running server. The server runs until the process exits.
#[derive(Clone)]
pub struct TestServer {
    base: String,
    state: Arc<Mutex<State>>,
}

impl TestServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(State::default()));
        let server_state = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let state = Arc::clone(&server_state);
                thread::spawn(move || handle(stream, &state));
            }
        });
        Self {
            base: format!("http://127.0.0.1:{}/", port),
            state,
        }
    }

    /// Base URL with a trailing slash.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    /// Always answer `path` with `route`.
    pub fn route(&self, path: &str, route: Route) {
        self.sequence(path, vec![route]);
    }

    /// Answer `path` with each route in turn; the last one repeats.
    pub fn sequence(&self, path: &str, routes: Vec<Route>) {
        let mut state = self.state.lock().unwrap();
        state.routes.insert(normalize(path), routes);
    }

    pub fn hits(&self, path: &str) -> u32 {
        let state = self.state.lock().unwrap();
        state.hits.get(&normalize(path)).copied().unwrap_or(0)
    }

    /// `Accept-Encoding` of the last request for `path`.
    pub fn accept_encoding(&self, path: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.accept_encoding.get(&normalize(path)).cloned()
    }
}

fn normalize(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

fn handle(mut stream: TcpStream, state: &Mutex<State>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let request = match read_head(&mut stream) {
        Some(r) => r,
        None => return,
    };
    let (method, path, accept_encoding) = parse_request(&request);
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    let route = {
        let mut state = state.lock().unwrap();
        let hit = {
            let n = state.hits.entry(path.clone()).or_insert(0);
            *n += 1;
            *n
        };
        if let Some(value) = accept_encoding {
            state.accept_encoding.insert(path.clone(), value);
        }
        state.routes.get(&path).and_then(|routes| {
            let idx = (hit as usize - 1).min(routes.len().saturating_sub(1));
            routes.get(idx).cloned()
        })
    };
    let route = route.unwrap_or_else(|| Route::status(404));

    let encoding = route
        .content_encoding
        .map(|e| format!("Content-Encoding: {}\r\n", e))
        .unwrap_or_default();
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
        route.status,
        reason(route.status),
        route.body.len(),
        encoding
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(&route.body);
}

fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
        if buf.len() > 64 * 1024 {
            return None;
        }
    }
    String::from_utf8(buf).ok()
}

/// Returns (method, path, Accept-Encoding value).
fn parse_request(request: &str) -> (String, String, Option<String>) {
    let mut lines = request.lines();
    let mut first = lines.next().unwrap_or("").split_whitespace();
    let method = first.next().unwrap_or("").to_string();
    let path = first.next().unwrap_or("/").to_string();
    let mut accept_encoding = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("accept-encoding") {
                accept_encoding = Some(value.trim().to_string());
            }
        }
    }
    (method, path, accept_encoding)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
