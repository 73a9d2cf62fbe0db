use smart_fetch::FetchState;
use tokio::sync::mpsc;

/// Application events
#[derive(Debug)]
pub enum Event {
  /// A subscription published a new state
  State { run: usize, state: FetchState },
  /// Ctrl-C was pressed
  Interrupt,
}

/// Event handler that collects subscription updates and interrupts
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn interrupt listener
    let interrupt_tx = tx.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        let _ = interrupt_tx.send(Event::Interrupt);
      }
    });

    Self { tx, rx }
  }

  /// Sender for subscription listeners
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
