//! Pending-request registry
//!
//! Correlates responses arriving on a transport thread with the caller
//! blocked in [`PendingRegistry::wait`]. One mutex guards the id counter and
//! the table; every entry owns its own condition variable so a delivery wakes
//! exactly the caller that owns the id.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use relaymcp_core::jsonrpc::Response;
use relaymcp_core::{IntMap, McpError, McpResult};

/// Lifecycle of one outstanding request
#[derive(Debug, Clone, PartialEq)]
pub enum PendingStatus {
    /// No response yet
    Waiting,
    /// Response arrived with a result (stringified JSON)
    Completed(String),
    /// Response arrived with an error, or the transport failed
    Error(McpError),
    /// The caller's deadline passed first
    Timeout,
    /// A response for this id arrived but could not be parsed
    Invalid,
}

impl PendingStatus {
    /// Whether the entry is still waiting for a response
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::Waiting)
    }
}

/// Outcome of handing a response to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A waiting caller was signalled
    Delivered,
    /// No entry exists for the id
    Unknown,
    /// The entry had already completed, failed or timed out
    AlreadyCompleted,
}

#[derive(Debug)]
struct PendingEntry {
    status: PendingStatus,
    signal: Arc<Condvar>,
}

#[derive(Debug)]
struct RegistryState {
    next_id: u64,
    pending: IntMap<u64, PendingEntry>,
}

/// Table of outstanding requests keyed by id
#[derive(Debug)]
pub struct PendingRegistry {
    state: Mutex<RegistryState>,
}

impl Default for PendingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRegistry {
    /// Empty registry whose first id is 1
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                next_id: 1,
                pending: IntMap::new(),
            }),
        }
    }

    /// Allocate the next request id
    pub fn next_id(&self) -> u64 {
        let mut state = self.state.lock();
        let id = state.next_id;
        // Zero means "no id"; skip it if the counter ever wraps
        state.next_id = state.next_id.checked_add(1).unwrap_or(1);
        id
    }

    /// Insert a WAITING entry for `id`
    ///
    /// # Errors
    ///
    /// Fails if an entry for `id` already exists or the table cannot grow.
    pub fn register(&self, id: u64) -> McpResult<()> {
        let mut state = self.state.lock();
        if state.pending.contains_key(&id) {
            return Err(McpError::internal(format!("Request ID {id} is already pending")));
        }
        state
            .pending
            .put(
                id,
                PendingEntry {
                    status: PendingStatus::Waiting,
                    signal: Arc::new(Condvar::new()),
                },
            )
            .map_err(|e| McpError::internal(format!("Failed to register request {id}: {e}")))?;
        Ok(())
    }

    /// Unlink an entry without waiting
    pub fn remove(&self, id: u64) -> Option<PendingStatus> {
        self.state.lock().pending.remove(&id).map(|entry| entry.status)
    }

    /// Whether `id` has an entry
    pub fn contains(&self, id: u64) -> bool {
        self.state.lock().pending.contains_key(&id)
    }

    /// Number of outstanding entries
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether no request is outstanding
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand a parsed response to its waiter
    pub fn deliver(&self, response: Response) -> Delivery {
        let status = match response.outcome {
            Ok(result) => PendingStatus::Completed(result),
            Err(error) => PendingStatus::Error(error),
        };
        self.resolve(response.id, status)
    }

    /// Mark a waiting entry whose response could not be parsed
    pub fn mark_invalid(&self, id: u64) -> Delivery {
        self.resolve(id, PendingStatus::Invalid)
    }

    fn resolve(&self, id: u64, status: PendingStatus) -> Delivery {
        let mut state = self.state.lock();
        let Some(entry) = state.pending.get_mut(&id) else {
            return Delivery::Unknown;
        };
        if !entry.status.is_waiting() {
            return Delivery::AlreadyCompleted;
        }
        entry.status = status;
        entry.signal.notify_one();
        Delivery::Delivered
    }

    /// Fail every waiting entry with `error` and wake its caller
    ///
    /// Returns how many callers were woken.
    pub fn fail_all(&self, error: &McpError) -> usize {
        let mut state = self.state.lock();
        let mut woken = 0;
        state.pending.retain(|_, entry| {
            if entry.status.is_waiting() {
                entry.status = PendingStatus::Error(error.clone());
                entry.signal.notify_one();
                woken += 1;
            }
            true
        });
        if woken > 0 {
            debug!("Woke {} pending requests: {}", woken, error.message);
        }
        woken
    }

    /// Block until `id` leaves WAITING or `timeout` elapses, then remove it
    ///
    /// `None` waits indefinitely. On timeout the entry is marked
    /// [`PendingStatus::Timeout`] before removal, so a late response is
    /// reported as already completed rather than delivered.
    pub fn wait(&self, id: u64, timeout: Option<Duration>) -> PendingStatus {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut state = self.state.lock();

        loop {
            let signal = match state.pending.get(&id) {
                Some(entry) if entry.status.is_waiting() => Arc::clone(&entry.signal),
                Some(_) => break,
                None => {
                    warn!("Request {} vanished from the registry while waiting", id);
                    return PendingStatus::Invalid;
                }
            };

            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline
                        || signal.wait_for(&mut state, deadline - now).timed_out()
                    {
                        if let Some(entry) = state.pending.get_mut(&id)
                            && entry.status.is_waiting()
                        {
                            entry.status = PendingStatus::Timeout;
                        }
                    }
                }
                None => signal.wait(&mut state),
            }
        }

        state
            .pending
            .remove(&id)
            .map_or(PendingStatus::Invalid, |entry| entry.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymcp_core::ErrorCode;
    use std::thread;

    fn response(id: u64, outcome: Result<&str, McpError>) -> Response {
        Response {
            id,
            outcome: outcome.map(str::to_string),
        }
    }

    #[test]
    fn test_ids_are_monotonic() {
        let registry = PendingRegistry::new();
        assert_eq!(registry.next_id(), 1);
        assert_eq!(registry.next_id(), 2);
        assert_eq!(registry.next_id(), 3);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = PendingRegistry::new();
        registry.register(7).unwrap();
        assert!(registry.register(7).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_delivery_before_wait() {
        let registry = PendingRegistry::new();
        registry.register(1).unwrap();
        assert_eq!(registry.deliver(response(1, Ok("{}"))), Delivery::Delivered);
        assert_eq!(
            registry.wait(1, Some(Duration::from_secs(1))),
            PendingStatus::Completed("{}".into())
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_delivery_wakes_waiter() {
        let registry = Arc::new(PendingRegistry::new());
        registry.register(5).unwrap();

        let deliverer = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                registry.deliver(response(5, Err(McpError::method_not_found("nope"))))
            })
        };

        let status = registry.wait(5, Some(Duration::from_secs(5)));
        assert_eq!(deliverer.join().unwrap(), Delivery::Delivered);
        match status {
            PendingStatus::Error(e) => assert_eq!(e.code, ErrorCode::MethodNotFound),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn test_timeout_removes_entry() {
        let registry = PendingRegistry::new();
        registry.register(9).unwrap();
        let started = Instant::now();
        assert_eq!(
            registry.wait(9, Some(Duration::from_millis(30))),
            PendingStatus::Timeout
        );
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(!registry.contains(9));
        assert_eq!(registry.deliver(response(9, Ok("null"))), Delivery::Unknown);
    }

    #[test]
    fn test_second_delivery_is_discarded() {
        let registry = PendingRegistry::new();
        registry.register(3).unwrap();
        assert_eq!(registry.deliver(response(3, Ok("1"))), Delivery::Delivered);
        assert_eq!(
            registry.deliver(response(3, Ok("2"))),
            Delivery::AlreadyCompleted
        );
        assert_eq!(registry.wait(3, None), PendingStatus::Completed("1".into()));
    }

    #[test]
    fn test_fail_all_wakes_every_waiter() {
        let registry = Arc::new(PendingRegistry::new());
        let waiters: Vec<_> = (1..=4)
            .map(|id| {
                registry.register(id).unwrap();
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.wait(id, None))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        assert_eq!(registry.fail_all(&McpError::transport("transport stopping")), 4);

        for waiter in waiters {
            match waiter.join().unwrap() {
                PendingStatus::Error(e) => assert_eq!(e.message, "transport stopping"),
                other => panic!("unexpected status {other:?}"),
            }
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_mark_invalid() {
        let registry = PendingRegistry::new();
        registry.register(2).unwrap();
        assert_eq!(registry.mark_invalid(2), Delivery::Delivered);
        assert_eq!(registry.wait(2, None), PendingStatus::Invalid);
    }
}
