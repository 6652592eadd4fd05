//! Connection registry and group membership index.
//!
//! Both maps live behind one `parking_lot::Mutex` so that connect, teardown
//! and fan-out each see a consistent view of "who is online" and "who is in
//! which group". The lock is never held across an `.await`: fan-out only
//! enqueues into per-connection outbound queues, and the socket writes happen
//! in each connection's own task.

use std::collections::{HashMap, HashSet};

use chat_common::GroupId;
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use ulid::Ulid;

use super::events::{OutboundFrame, CLOSE_GOING_AWAY, CLOSE_REPLACED, CLOSE_SLOW_CONSUMER};

/// Why the registry asked a connection to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// A newer connection authenticated as the same user.
    Replaced,
    /// The outbound queue overflowed.
    SlowConsumer,
    Shutdown,
}

impl CloseReason {
    pub fn code(self) -> u16 {
        match self {
            Self::Replaced => CLOSE_REPLACED,
            Self::SlowConsumer => CLOSE_SLOW_CONSUMER,
            Self::Shutdown => CLOSE_GOING_AWAY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replaced => "Replaced by a newer connection",
            Self::SlowConsumer => "Slow consumer",
            Self::Shutdown => "Server shutting down",
        }
    }
}

/// What a session task receives when it registers.
pub struct ConnectionHandle {
    pub conn_id: String,
    /// Frames to write to this connection's socket, in order.
    pub outbox: mpsc::Receiver<OutboundFrame>,
    /// Fires when the registry wants this connection closed.
    pub closed: oneshot::Receiver<CloseReason>,
}

struct ConnectionEntry {
    conn_id: String,
    /// Groups this user was added to in the index; teardown removes exactly these.
    groups: HashSet<GroupId>,
    outbox: mpsc::Sender<OutboundFrame>,
    close: Option<oneshot::Sender<CloseReason>>,
}

impl ConnectionEntry {
    fn signal_close(&mut self, reason: CloseReason) {
        if let Some(tx) = self.close.take() {
            let _ = tx.send(reason);
        }
    }
}

#[derive(Default)]
struct Inner {
    connections: HashMap<String, ConnectionEntry>,
    groups: HashMap<GroupId, HashSet<String>>,
}

impl Inner {
    fn join(&mut self, username: &str, group_id: GroupId) {
        self.groups
            .entry(group_id)
            .or_default()
            .insert(username.to_string());
    }

    /// Remove a connection and every trace of it from the group index.
    fn remove(&mut self, username: &str) -> Option<ConnectionEntry> {
        let entry = self.connections.remove(username)?;
        for group_id in &entry.groups {
            if let Some(members) = self.groups.get_mut(group_id) {
                members.remove(username);
                if members.is_empty() {
                    self.groups.remove(group_id);
                }
            }
        }
        Some(entry)
    }

    fn evict(&mut self, username: &str, reason: CloseReason) {
        if let Some(mut entry) = self.remove(username) {
            tracing::info!(%username, conn_id = %entry.conn_id, ?reason, "connection evicted");
            entry.signal_close(reason);
        }
    }

    /// Enqueue without blocking. A full queue evicts the receiver.
    fn enqueue(&mut self, username: &str, frame: &OutboundFrame) -> bool {
        let Some(entry) = self.connections.get(username) else {
            return false;
        };
        match entry.outbox.try_send(frame.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(%username, conn_id = %entry.conn_id, "outbound queue full, disconnecting");
                self.evict(username, CloseReason::SlowConsumer);
                false
            }
            Err(TrySendError::Closed(_)) => {
                // Session task already gone; its own teardown removes the entry.
                tracing::debug!(%username, "outbound queue closed");
                false
            }
        }
    }
}

/// Fresh connection id, e.g. `conn_01HV...`.
fn new_conn_id() -> String {
    format!("conn_{}", Ulid::new())
}

/// Process-wide registry of live connections and their group memberships.
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Register an authenticated connection.
    ///
    /// Any existing connection for the same user is removed and told to close
    /// in the same critical section, so a user never has two live entries.
    pub fn connect(
        &self,
        username: &str,
        groups: impl IntoIterator<Item = GroupId>,
        capacity: usize,
    ) -> ConnectionHandle {
        let (outbox_tx, outbox_rx) = mpsc::channel(capacity.max(1));
        let (close_tx, close_rx) = oneshot::channel();
        let conn_id = new_conn_id();
        let groups: HashSet<GroupId> = groups.into_iter().collect();

        let mut inner = self.inner.lock();
        inner.evict(username, CloseReason::Replaced);
        for group_id in &groups {
            inner.join(username, *group_id);
        }
        inner.connections.insert(
            username.to_string(),
            ConnectionEntry {
                conn_id: conn_id.clone(),
                groups,
                outbox: outbox_tx,
                close: Some(close_tx),
            },
        );
        drop(inner);

        ConnectionHandle {
            conn_id,
            outbox: outbox_rx,
            closed: close_rx,
        }
    }

    /// Tear down a connection. Only removes the entry if `conn_id` is still the
    /// registered one; a replaced session's late teardown is a no-op.
    pub fn disconnect(&self, username: &str, conn_id: &str) -> bool {
        let mut inner = self.inner.lock();
        let is_current = inner
            .connections
            .get(username)
            .is_some_and(|entry| entry.conn_id == conn_id);
        is_current && inner.remove(username).is_some()
    }

    /// Enqueue `frame` for every connected member of `group_id` except
    /// `exclude`.
    ///
    /// Returns `false` if the group is not in the index at all, regardless of
    /// how many members turned out to be reachable otherwise.
    pub fn broadcast_to_group(&self, group_id: GroupId, frame: &OutboundFrame, exclude: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(members) = inner.groups.get(&group_id) else {
            return false;
        };
        let targets: Vec<String> = members
            .iter()
            .filter(|member| member.as_str() != exclude)
            .cloned()
            .collect();

        for member in &targets {
            inner.enqueue(member, frame);
        }
        true
    }

    /// Enqueue `frame` for a single user. Returns `false` if they are offline.
    pub fn send_to(&self, username: &str, frame: &OutboundFrame) -> bool {
        self.inner.lock().enqueue(username, frame)
    }

    /// Add a connected user to more groups (membership refresh).
    ///
    /// Offline users are never added, so every identity in the index keeps a
    /// live connection. Returns `false` in that case.
    pub fn merge_groups(&self, username: &str, groups: impl IntoIterator<Item = GroupId>) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.connections.get_mut(username) else {
            return false;
        };
        let added: Vec<GroupId> = groups
            .into_iter()
            .filter(|group_id| entry.groups.insert(*group_id))
            .collect();
        for group_id in added {
            inner.join(username, group_id);
        }
        true
    }

    /// Ask every live connection to close. Returns how many were signalled.
    pub fn close_all(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut signalled = 0;
        for entry in inner.connections.values_mut() {
            if entry.close.is_some() {
                entry.signal_close(CloseReason::Shutdown);
                signalled += 1;
            }
        }
        signalled
    }

    pub fn is_connected(&self, username: &str) -> bool {
        self.inner.lock().connections.contains_key(username)
    }

    pub fn connection_id(&self, username: &str) -> Option<String> {
        self.inner
            .lock()
            .connections
            .get(username)
            .map(|entry| entry.conn_id.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    pub fn group_count(&self) -> usize {
        self.inner.lock().groups.len()
    }

    /// Connected members of a group, sorted. Empty if the group is unknown.
    pub fn group_members(&self, group_id: GroupId) -> Vec<String> {
        let inner = self.inner.lock();
        let mut members: Vec<String> = inner
            .groups
            .get(&group_id)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Whether `username` is connected and cached as a member of `group_id`.
    pub fn is_member(&self, username: &str, group_id: GroupId) -> bool {
        self.inner
            .lock()
            .connections
            .get(username)
            .is_some_and(|entry| entry.groups.contains(&group_id))
    }

    pub fn has_group(&self, group_id: GroupId) -> bool {
        self.inner.lock().groups.contains_key(&group_id)
    }
}
