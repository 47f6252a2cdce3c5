//! Stateless pub-sub plumbing for engine events.
//!
//! Each event type gets its own channel. Producers are cheap clones holding the send half;
//! the handler side owns the receiver and fans every event out to a user-supplied async
//! closure on a fresh task. Handlers receive the event and nothing else, so they cannot
//! reach back into engine state.
//!
//! Shutdown is automatic: when the last producer is dropped the channel closes, the receive
//! loop drains, and `start_handler` waits for in-flight jobs before returning.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use log::*;
use tokio::sync::mpsc;

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, listener) = mpsc::channel(buffer_size);
        Self { listener, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Run the dispatch loop until every producer has been dropped, then wait for the spawned
    /// handler jobs to finish.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // The handler keeps a sender only so that `subscribe` can hand out producers. Drop it
        // here, otherwise the loop below would never see the channel close.
        drop(self.sender);
        let jobs = Arc::new(AtomicI64::new(0));
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Handling event");
            let handler = Arc::clone(&self.handler);
            jobs.fetch_add(1, Ordering::SeqCst);
            let job = Arc::clone(&jobs);
            tokio::spawn(async move {
                (handler)(ev).await;
                job.fetch_sub(1, Ordering::Relaxed);
                trace!("📬️ Event handled");
            });
        }
        while jobs.load(Ordering::SeqCst) > 0 {
            debug!("📬️ Waiting for {} event job(s) to complete", jobs.load(Ordering::SeqCst));
            tokio::time::sleep(tokio::time::Duration::from_millis(250)).await;
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }
}
