//! Scripted transport for wire-level tests.

use esorm_gateway::{EsConfig, Gateway, GatewayError, GatewayResult, Request, Response, Transport};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug)]
enum Reply {
    Response(Response),
    Error(GatewayError),
}

/// A transport that answers with queued replies and records every request.
///
/// Useful to check exactly what the gateway puts on the wire and how it
/// normalizes a given backend answer. Running out of replies is a transport
/// error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
    /// Creates a transport with no queued replies.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a gateway over this transport.
    pub fn gateway(self: &Arc<Self>) -> Gateway {
        Gateway::with_transport(EsConfig::default(), Arc::clone(self) as Arc<dyn Transport>)
    }

    /// Queues a response.
    pub fn reply(&self, status: u16, body: impl Into<String>) -> &Self {
        self.replies
            .lock()
            .push_back(Reply::Response(Response::new(status, body.into())));
        self
    }

    /// Queues a JSON response.
    pub fn reply_json(&self, status: u16, body: Value) -> &Self {
        self.reply(status, body.to_string())
    }

    /// Queues a transport failure.
    pub fn fail(&self, error: GatewayError) -> &Self {
        self.replies.lock().push_back(Reply::Error(error));
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    /// The last request received.
    pub fn last_request(&self) -> Option<Request> {
        self.requests.lock().last().cloned()
    }

    /// Decoded JSON body of the last request.
    pub fn last_body(&self) -> Option<Value> {
        self.last_request()
            .and_then(|request| request.body)
            .and_then(|body| serde_json::from_slice(&body).ok())
    }

    /// Number of replies not consumed yet.
    pub fn pending(&self) -> usize {
        self.replies.lock().len()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &Request) -> GatewayResult<Response> {
        self.requests.lock().push(request.clone());
        match self.replies.lock().pop_front() {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Error(error)) => Err(error),
            None => Err(GatewayError::transport(format!(
                "no scripted reply for {} {}",
                request.method,
                request.path_string()
            ))),
        }
    }
}
