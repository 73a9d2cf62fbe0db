use crate::event::{Event, EventHandler};
use color_eyre::{eyre::eyre, Result};
use serde_json::json;
use smart_fetch::config::Config;
use smart_fetch::{
  global_cache, FetchOptions, FetchState, QueryStatus, ReqwestTransport, SmartFetch, Subscription,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// What the user asked for on the command line
#[derive(Debug, Clone)]
pub struct Plan {
  pub url: String,
  pub options: FetchOptions,
  /// Number of sequential subscriptions to the same request
  pub repeat: usize,
  /// Call refetch once after the first subscription settles
  pub refetch: bool,
}

/// Main application state
pub struct App {
  plan: Plan,
  client: SmartFetch,
  /// Final state of the most recent subscription
  last: Option<FetchState>,
}

impl App {
  pub fn new(config: &Config, plan: Plan) -> Result<Self> {
    let transport = ReqwestTransport::new(&config.http)?;
    let cache = global_cache();

    if let Some(interval_ms) = config.cache.sweep_interval_ms {
      cache.spawn_sweeper(Duration::from_millis(interval_ms));
    }

    Ok(Self {
      plan,
      client: SmartFetch::new(cache, Arc::new(transport)),
      last: None,
    })
  }

  /// Run every subscription in turn, printing each state change.
  ///
  /// Returns whether the last subscription settled without an error.
  pub async fn run(&mut self) -> Result<bool> {
    let mut events = EventHandler::new();

    for run in 0..self.plan.repeat.max(1) {
      let tx = events.sender();
      let subscription =
        self
          .client
          .subscribe(self.plan.url.clone(), self.plan.options.clone(), move |state| {
            let _ = tx.send(Event::State {
              run,
              state: state.clone(),
            });
          });

      self.wait_for_settle(&mut events, run).await?;

      if self.plan.refetch && run == 0 {
        self.refetch(&subscription).await?;
        self.wait_for_settle(&mut events, run).await?;
      }

      info!(run, cached = self.client.cache().size(), "Subscription finished");
    }

    Ok(
      self
        .last
        .as_ref()
        .is_some_and(|state| state.status() != QueryStatus::Failure),
    )
  }

  async fn refetch(&self, subscription: &Subscription) -> Result<()> {
    tokio::select! {
      _ = subscription.refetch() => Ok(()),
      _ = tokio::signal::ctrl_c() => Err(eyre!("Interrupted")),
    }
  }

  async fn wait_for_settle(&mut self, events: &mut EventHandler, run: usize) -> Result<()> {
    while let Some(event) = events.next().await {
      match event {
        Event::State { run: from, state } => {
          print_state(from, &state);
          if from == run && !state.loading {
            self.last = Some(state);
            return Ok(());
          }
        }
        Event::Interrupt => return Err(eyre!("Interrupted")),
      }
    }
    Err(eyre!("Event channel closed"))
  }
}

fn print_state(run: usize, state: &FetchState) {
  let line = json!({
    "run": run,
    "status": state.status().as_str(),
    "loading": state.loading,
    "data": state.data(),
    "error": state.error().map(ToString::to_string),
  });
  println!("{}", line);
}
