// src/communication/device.rs - Exclusive, half-duplex access to one transport
use super::serial::{SerialTransport, Transport};
use crate::error::{MountError, MountResult};
use std::time::Duration;
use tokio::sync::{watch, Mutex, MutexGuard};

/// Every reply ends with this byte.
pub const TERMINATOR: u8 = b'#';

struct Link {
    transport: Box<dyn Transport>,
    /// Set while an exchange is outstanding and after any failed one; a reply
    /// may still be on its way and must not be read as the next answer.
    needs_resync: bool,
}

impl Link {
    async fn round_trip(&mut self, frame: &[u8], reply_len: usize) -> MountResult<Vec<u8>> {
        if self.needs_resync {
            self.transport.discard_input().await?;
        }
        self.needs_resync = true;
        tracing::debug!("Mount <- {}", frame.escape_ascii());
        self.transport.send(frame).await?;
        let mut reply = self.transport.receive(reply_len).await?;
        tracing::debug!("Mount -> {}", reply.escape_ascii());
        if reply.last() != Some(&TERMINATOR) {
            return Err(MountError::MalformedResponse(format!(
                "reply '{}' to '{}' is not terminated by '#'",
                reply.escape_ascii(),
                frame.escape_ascii()
            )));
        }
        self.needs_resync = false;
        reply.pop();
        Ok(reply)
    }
}

/// Owner of the physical link. Connected from construction until `close`.
pub struct DeviceHandle {
    link: Mutex<Option<Link>>,
    timeout: Duration,
    closed: watch::Sender<bool>,
    name: String,
}

impl DeviceHandle {
    pub fn connect(port: &str, baud: u32, timeout: Duration) -> MountResult<Self> {
        let transport = SerialTransport::open(port, baud)?;
        Ok(Self::with_transport(Box::new(transport), timeout))
    }

    pub fn with_transport(transport: Box<dyn Transport>, timeout: Duration) -> Self {
        let name = transport.describe();
        tracing::info!("Connected to {}", name);
        let (closed, _) = watch::channel(false);
        Self {
            link: Mutex::new(Some(Link { transport, needs_resync: false })),
            timeout,
            closed,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_connected(&self) -> bool {
        !*self.closed.borrow()
    }

    /// Exclusive use of the link until the session is dropped.
    pub async fn session(&self) -> MountResult<Session<'_>> {
        if !self.is_connected() {
            return Err(MountError::NotConnected);
        }
        let guard = self.link.lock().await;
        if guard.is_none() {
            return Err(MountError::NotConnected);
        }
        Ok(Session { guard, handle: self })
    }

    pub async fn exchange(&self, frame: &[u8], reply_len: usize) -> MountResult<Vec<u8>> {
        self.session().await?.exchange(frame, reply_len).await
    }

    /// Abort any outstanding wait and release the transport. Idempotent.
    pub async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        let mut guard = self.link.lock().await;
        if guard.take().is_some() {
            tracing::info!("Disconnected from {}", self.name);
        }
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("connected", &self.is_connected())
            .finish()
    }
}

pub struct Session<'a> {
    guard: MutexGuard<'a, Option<Link>>,
    handle: &'a DeviceHandle,
}

impl Session<'_> {
    /// One request and its reply, payload returned without the terminator.
    pub async fn exchange(&mut self, frame: &[u8], reply_len: usize) -> MountResult<Vec<u8>> {
        let handle = self.handle;
        let mut closed = handle.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(MountError::NotConnected);
        }
        let link = self.guard.as_mut().ok_or(MountError::NotConnected)?;
        tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => Err(MountError::NotConnected),
            result = tokio::time::timeout(handle.timeout, link.round_trip(frame, reply_len)) => match result {
                Ok(reply) => reply,
                Err(_) => {
                    tracing::warn!("No reply from {} within {:?}", handle.name, handle.timeout);
                    Err(MountError::Timeout(handle.timeout))
                }
            },
        }
    }

    /// Hold the link idle for `duration`; ends early with `NotConnected` if closed.
    pub async fn pause(&mut self, duration: Duration) -> MountResult<()> {
        let mut closed = self.handle.closed.subscribe();
        tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => Err(MountError::NotConnected),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
