//! In-memory session fake for unit tests.

use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::session::{EnqueueResult, Session};
use crate::types::{CloseReason, Device, Identity, Message, Principal, SessionId};

/// Session that records what it is sent instead of writing to a connection.
pub struct FakeSession {
    id: SessionId,
    identity: Mutex<Identity>,
    delivered: Mutex<Vec<Message>>,
    close_reason: OnceLock<CloseReason>,
    shutdown: CancellationToken,
}

impl FakeSession {
    pub fn anonymous(temp: Principal) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::new(temp),
            identity: Mutex::new(Identity::anonymous(temp)),
            delivered: Mutex::new(Vec::new()),
            close_reason: OnceLock::new(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn signed_in(temp: Principal, uid: Principal, device: Device) -> Arc<Self> {
        let session = Self::anonymous(temp);
        session.bind(uid, device);
        session
    }

    pub fn delivered(&self) -> Vec<Message> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Session for FakeSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn identity(&self) -> Identity {
        *self.identity.lock().unwrap()
    }

    fn bind(&self, principal: Principal, device: Device) {
        *self.identity.lock().unwrap() = Identity::new(principal, device);
    }

    async fn run(self: Arc<Self>) {
        self.shutdown.cancelled().await;
    }

    fn enqueue(&self, message: Message) -> EnqueueResult {
        if self.is_closed() {
            return EnqueueResult::Closed;
        }
        self.delivered.lock().unwrap().push(message);
        EnqueueResult::Queued
    }

    fn close(&self, reason: CloseReason) -> bool {
        if self.close_reason.set(reason).is_err() {
            return false;
        }
        self.shutdown.cancel();
        true
    }

    fn is_closed(&self) -> bool {
        self.close_reason.get().is_some()
    }

    fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.get().copied()
    }
}
