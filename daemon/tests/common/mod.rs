// Shared helpers for fusiond integration tests.
#![allow(dead_code)]

use fusiond::dispatch::SpeechEngine;
use shared::NewContextRequest;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

pub const WAIT: Duration = Duration::from_secs(2);

pub fn session(source: &str, session_id: &str) -> NewContextRequest {
    NewContextRequest {
        source: source.to_string(),
        target: "FUSION".to_string(),
        session_id: session_id.to_string(),
        medium: "visual".to_string(),
        mode: "command".to_string(),
    }
}

/// Speech engine that is never busy and remembers what it said.
#[derive(Clone, Default)]
pub struct Transcript {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Transcript {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub async fn wait_for(&self, count: usize) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let lines = self.lines();
            if lines.len() >= count || tokio::time::Instant::now() >= deadline {
                return lines;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl SpeechEngine for Transcript {
    fn is_busy(&self) -> bool {
        false
    }

    fn speak(&mut self, text: &str) -> anyhow::Result<()> {
        self.lines.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Receive one item or give up after [`WAIT`].
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Option<T> {
    tokio::time::timeout(WAIT, rx.recv()).await.ok().flatten()
}

/// Minimal HTTP/1.1 POST, returning the raw response text.
pub async fn post_json(address: SocketAddr, body: &str) -> String {
    let request = format!(
        "POST / HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        address,
        body.len(),
        body
    );
    let mut stream = TcpStream::connect(address).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}
