//! Multi-subscriber event fan-out with replay of the latest event.
//!
//! Each [`Broadcaster`] owns its listener list. A [`Subscription`] is released
//! by dropping it; the broadcaster prunes dead listeners on the next publish.

use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

struct State<E> {
    latest: Option<E>,
    listeners: Vec<mpsc::UnboundedSender<E>>,
    closed: bool,
}

pub struct Broadcaster<E> {
    state: Arc<Mutex<State<E>>>,
}

impl<E> Clone for Broadcaster<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<E: Clone> Default for Broadcaster<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> Broadcaster<E> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                latest: None,
                listeners: Vec::new(),
                closed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe, receiving the latest event (if any) first.
    /// After `close`, the subscription yields the final event and ends.
    pub fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        if let Some(latest) = &state.latest {
            let _ = tx.send(latest.clone());
        }
        if !state.closed {
            state.listeners.push(tx);
        }
        Subscription { rx }
    }

    pub fn publish(&self, event: E) {
        let mut state = self.lock();
        if state.closed {
            tracing::debug!("Dropping event published after close");
            return;
        }
        state.listeners.retain(|tx| tx.send(event.clone()).is_ok());
        state.latest = Some(event);
    }

    /// Publish a terminal event and end every subscription
    pub fn finish(&self, event: E) {
        self.publish(event);
        self.close();
    }

    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.listeners.clear();
    }

    pub fn latest(&self) -> Option<E> {
        self.lock().latest.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Live listener count, including ones dropped since the last publish
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

pub struct Subscription<E> {
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E> Subscription<E> {
    /// Next event, or `None` once the broadcaster is closed and drained
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }
}

impl<E> Stream for Subscription<E> {
    type Item = E;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<E>> {
        self.rx.poll_recv(cx)
    }
}
