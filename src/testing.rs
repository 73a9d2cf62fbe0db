//! In-process transport for unit tests.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::fetch::{FetchError, HttpRequest, HttpResponse, HttpTransport};

/// One scripted answer.
#[derive(Debug, Clone)]
pub struct Reply {
  delay: Duration,
  outcome: Result<HttpResponse, String>,
}

impl Reply {
  pub fn respond(response: HttpResponse) -> Self {
    Self {
      delay: Duration::ZERO,
      outcome: Ok(response),
    }
  }

  pub fn json(value: Value) -> Self {
    Self::respond(HttpResponse::json(&value))
  }

  pub fn status(status: u16) -> Self {
    Self::respond(HttpResponse::new(status, None, ""))
  }

  pub fn fail(message: &str) -> Self {
    Self {
      delay: Duration::ZERO,
      outcome: Err(message.to_string()),
    }
  }

  pub fn after(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }
}

/// Answers requests from a script, recording every request it sees.
///
/// Replies are consumed in order; the last one repeats once the script runs out.
pub struct ScriptedTransport {
  replies: Mutex<VecDeque<Reply>>,
  requests: Mutex<Vec<HttpRequest>>,
  calls: AtomicUsize,
}

impl ScriptedTransport {
  pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
    Self {
      replies: Mutex::new(replies.into_iter().collect()),
      requests: Mutex::new(Vec::new()),
      calls: AtomicUsize::new(0),
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn requests(&self) -> Vec<HttpRequest> {
    self.requests.lock().unwrap().clone()
  }

  fn next_reply(&self) -> Reply {
    let mut replies = self.replies.lock().unwrap();
    if replies.len() > 1 {
      replies.pop_front().unwrap()
    } else {
      replies.front().cloned().expect("script has no replies")
    }
  }
}

impl HttpTransport for ScriptedTransport {
  fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, FetchError>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.requests.lock().unwrap().push(request);
    let reply = self.next_reply();

    Box::pin(async move {
      if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
      }
      reply.outcome.map_err(FetchError::Transport)
    })
  }
}
