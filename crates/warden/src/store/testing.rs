//! In-process fake remote store node for tests.
//!
//! Speaks the wire protocol through the crate's own codec and answers the
//! handful of commands Warden issues.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use super::resp::{self, Reply};

#[derive(Default)]
struct NodeInner {
    role: Mutex<String>,
    data: Mutex<HashMap<String, String>>,
    commands: Mutex<Vec<String>>,
    connections: AtomicUsize,
    broken: AtomicBool,
}

/// A running fake node bound to an ephemeral localhost port
#[derive(Clone)]
pub struct FakeNode {
    pub address: String,
    inner: Arc<NodeInner>,
}

impl FakeNode {
    /// Start a node reporting `role` (`master`, `slave`, or anything else)
    pub async fn spawn(role: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let inner = Arc::new(NodeInner::default());
        *inner.role.lock().unwrap() = role.to_string();

        let server = inner.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                server.connections.fetch_add(1, Ordering::SeqCst);
                if server.broken.load(Ordering::SeqCst) {
                    drop(socket);
                    continue;
                }

                let node = server.clone();
                tokio::spawn(async move {
                    let mut stream = BufReader::new(socket);
                    while let Ok(request) = resp::decode(&mut stream).await {
                        let reply = node.handle(request);
                        let mut buf = Vec::new();
                        resp::encode_reply(&reply, &mut buf);
                        if stream.get_mut().write_all(&buf).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        Self { address, inner }
    }

    /// Accepted connections so far (including dropped ones)
    pub fn connections(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    /// Drop every new connection without answering
    pub fn set_broken(&self, broken: bool) {
        self.inner.broken.store(broken, Ordering::SeqCst);
    }

    pub fn set_role(&self, role: &str) {
        *self.inner.role.lock().unwrap() = role.to_string();
    }

    /// How many times a command (e.g. `GET`) was received
    pub fn command_count(&self, name: &str) -> usize {
        self.inner
            .commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.eq_ignore_ascii_case(name))
            .count()
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.inner
            .data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.inner.data.lock().unwrap().get(key).cloned()
    }
}

impl NodeInner {
    fn handle(&self, request: Reply) -> Reply {
        let args: Vec<String> = match request {
            Reply::Array(Some(items)) => items.into_iter().filter_map(Reply::into_text).collect(),
            _ => return Reply::Error("ERR protocol error".to_string()),
        };
        let Some(name) = args.first() else {
            return Reply::Error("ERR empty command".to_string());
        };
        self.commands.lock().unwrap().push(name.to_uppercase());

        let mut data = self.data.lock().unwrap();
        match (name.to_uppercase().as_str(), args.len()) {
            ("PING", _) => Reply::Status("PONG".to_string()),
            ("INFO", _) => {
                let role = self.role.lock().unwrap().clone();
                Reply::Bulk(Some(
                    format!("# Replication\r\nrole:{}\r\nconnected_slaves:0\r\n", role).into_bytes(),
                ))
            }
            ("SET", n) if n >= 3 => {
                data.insert(args[1].clone(), args[2].clone());
                Reply::Status("OK".to_string())
            }
            ("GET", 2) => Reply::Bulk(data.get(&args[1]).map(|v| v.clone().into_bytes())),
            ("EXISTS", 2) => Reply::Integer(data.contains_key(&args[1]) as i64),
            ("DEL", 2) => Reply::Integer(data.remove(&args[1]).is_some() as i64),
            _ => Reply::Error(format!("ERR unknown command '{}'", name)),
        }
    }
}

/// An address nothing listens on
pub async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    address
}
