//! In-memory transport with scripted responses, for tests

use crate::client::errors::ApiError;
use crate::client::rpc::RemoteCall;
use crate::client::transport::Transport;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone)]
enum Scripted {
    Reply(Value),
    Fail(ApiError),
    Hang,
}

/// Replays scripted responses per method and records every call.
///
/// Each method holds a queue; the last entry repeats once the queue drains
/// to it.
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<BTreeMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RemoteCall>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: &str, entry: Scripted) -> &Self {
        self.scripts
            .lock()
            .entry(method.to_string())
            .or_default()
            .push_back(entry);
        self
    }

    pub fn reply(&self, method: &str, value: Value) -> &Self {
        self.push(method, Scripted::Reply(value))
    }

    pub fn fail(&self, method: &str, code: i64, message: &str) -> &Self {
        self.push(method, Scripted::Fail(ApiError::new(code, message)))
    }

    /// Never answer calls to `method`
    pub fn hang(&self, method: &str) -> &Self {
        self.push(method, Scripted::Hang)
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.method.clone()).collect()
    }

    pub fn calls_to(&self, method: &str) -> Vec<RemoteCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn call(&self, call: RemoteCall) -> Result<Value> {
        let method = call.method.clone();
        self.calls.lock().push(call);

        let next = {
            let mut scripts = self.scripts.lock();
            match scripts.get_mut(&method) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match next {
            Some(Scripted::Reply(value)) => Ok(value),
            Some(Scripted::Fail(err)) => Err(Error::Api(err)),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Err(Error::Protocol(format!("no scripted response for {}", method))),
        }
    }

    fn host(&self) -> &str {
        "mock.local"
    }
}
