//! In-memory transport with scripted responses, for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

type Scripted = Result<HttpResponse, String>;

/// Replies by URL suffix. Each route pops its queue in order; the last entry repeats.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<(String, VecDeque<Scripted>)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url_suffix: &str, replies: Vec<Scripted>) {
        let mut routes = self.routes.lock().unwrap();
        routes.retain(|(s, _)| s != url_suffix);
        routes.push((url_suffix.to_string(), replies.into()));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, url_suffix: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.ends_with(url_suffix))
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut routes = self.routes.lock().unwrap();
        let Some((_, queue)) = routes.iter_mut().find(|(s, _)| request.url.ends_with(s.as_str())) else {
            return Err(TransportError(format!("no scripted response for {}", request.url)));
        };
        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match reply {
            Some(Ok(res)) => Ok(res),
            Some(Err(e)) => Err(TransportError(e)),
            None => Err(TransportError(format!("empty script for {}", request.url))),
        }
    }
}
