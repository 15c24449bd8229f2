//! Event Queue
//!
//! Connection lifecycle notifications posted by the workers and the facade,
//! drained by remote callers through `eventPoll` / `eventWaitFor`.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::{SocketError, SocketResult};

pub const CONNECT_SUCCESS: &str = "BluetoothSocketConnectSuccess";
pub const CONNECT_ERROR: &str = "BluetoothSocketConnectError";
pub const ACCEPT_SUCCESS: &str = "BluetoothSocketAcceptSuccess";
pub const ACCEPT_ERROR: &str = "BluetoothSocketAcceptError";
pub const CONNECTION_LOST: &str = "BluetoothSocketConnectionLost";

/// A posted event
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub name: String,
    pub data: Value,
    /// Milliseconds since the Unix epoch
    pub time: u64,
}

/// Bounded FIFO of events; the oldest entry is dropped on overflow
#[derive(Debug)]
pub struct EventQueue {
    events: Mutex<VecDeque<Event>>,
    capacity: usize,
    posted: Notify,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            posted: Notify::new(),
        }
    }

    /// Append an event and wake waiters
    pub fn post(&self, name: &str, data: Value) {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        {
            let Ok(mut events) = self.events.lock() else {
                warn!("Event queue lock poisoned, dropping {}", name);
                return;
            };
            if events.len() >= self.capacity {
                if let Some(dropped) = events.pop_front() {
                    warn!("Event queue full, dropped {}", dropped.name);
                }
            }
            events.push_back(Event {
                name: name.to_string(),
                data,
                time,
            });
        }

        debug!("Posted event {}", name);
        self.posted.notify_waiters();
    }

    /// Remove and return up to `max` of the oldest events
    pub fn poll(&self, max: usize) -> Vec<Event> {
        match self.events.lock() {
            Ok(mut events) => {
                let n = max.min(events.len());
                events.drain(..n).collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Wait for the first event called `name`, removing it from the queue
    pub async fn wait_for(&self, name: &str, timeout: Duration) -> SocketResult<Event> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register interest before checking so a concurrent post is not missed
            let notified = self.posted.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(event) = self.take_first(name) {
                return Ok(event);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(SocketError::Timeout(timeout));
            }
        }
    }

    /// Drop every queued event
    pub fn clear(&self) -> usize {
        match self.events.lock() {
            Ok(mut events) => {
                let n = events.len();
                events.clear();
                n
            }
            Err(_) => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take_first(&self, name: &str) -> Option<Event> {
        let mut events = self.events.lock().ok()?;
        let index = events.iter().position(|event| event.name == name)?;
        events.remove(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_poll_is_fifo() {
        let queue = EventQueue::new(8);
        queue.post("a", json!(1));
        queue.post("b", json!(2));
        queue.post("c", json!(3));

        let events = queue.poll(2);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "a");
        assert_eq!(events[1].name, "b");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let queue = EventQueue::new(2);
        queue.post("a", Value::Null);
        queue.post("b", Value::Null);
        queue.post("c", Value::Null);

        let names: Vec<String> = queue.poll(10).into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_wait_for_skips_other_events() {
        let queue = EventQueue::new(8);
        queue.post(CONNECT_ERROR, json!({"error": "refused"}));
        queue.post(ACCEPT_SUCCESS, json!({"connectionId": "x"}));

        let event = queue
            .wait_for(ACCEPT_SUCCESS, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(event.data["connectionId"], "x");
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_wakes_on_post() {
        let queue = Arc::new(EventQueue::new(8));
        let poster = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            poster.post(CONNECT_SUCCESS, json!({}));
        });

        let event = queue.wait_for(CONNECT_SUCCESS, Duration::from_secs(2)).await;
        assert!(event.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let queue = EventQueue::new(8);
        let result = queue.wait_for(CONNECT_SUCCESS, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(SocketError::Timeout(_))));
    }

    #[test]
    fn test_clear() {
        let queue = EventQueue::new(8);
        queue.post("a", Value::Null);
        assert_eq!(queue.clear(), 1);
        assert!(queue.is_empty());
    }
}
