//! Build notification listener — the UDP receive loop.
//!
//! One datagram is handled at a time: decode, and on a completed failed build
//! resolve the breaker, map them to a chat handle and notify. Everything after
//! the receive is best-effort; a bad datagram or an unreachable downstream only
//! costs that one event.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::error::{EventError, ListenError};
use crate::models::build::BuildNotification;
use crate::models::identity::IdentityMap;
use crate::services::notifier::BreakNotifier;
use crate::services::resolver::ResponsibilityResolver;

/// Largest payload read from a single datagram.
pub const MAX_DATAGRAM_BYTES: usize = 8 * 1024;

/// Bind the notification socket on all interfaces.
pub async fn bind(port: u16) -> Result<UdpSocket, ListenError> {
    UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .await
        .map_err(|source| ListenError::Bind { port, source })
}

/// Where datagrams come from.
#[async_trait]
pub trait DatagramSource: Send {
    async fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

#[async_trait]
impl DatagramSource for UdpSocket {
    async fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.recv_from(buf).await
    }
}

/// Checked once before every receive; the loop stops when it returns `false`.
pub trait Continuation {
    fn proceed(&mut self) -> bool;
}

impl<C: Continuation + ?Sized> Continuation for &mut C {
    fn proceed(&mut self) -> bool {
        (**self).proceed()
    }
}

/// Never stops. The process is ended from outside.
pub struct Forever;

impl Continuation for Forever {
    fn proceed(&mut self) -> bool {
        true
    }
}

/// What happened to one datagram that was handled without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Not a completed failure.
    Ignored { phase: String, status: String },
    /// A failed build no configured member could be tied to.
    Unattributed { url: String },
    /// The breaker was called out.
    Notified { breaker: String, handle: String },
}

pub struct BuildListener {
    resolver: Arc<dyn ResponsibilityResolver>,
    notifier: Arc<dyn BreakNotifier>,
    identities: IdentityMap,
}

impl BuildListener {
    pub fn new(
        resolver: Arc<dyn ResponsibilityResolver>,
        notifier: Arc<dyn BreakNotifier>,
        identities: IdentityMap,
    ) -> Self {
        Self {
            resolver,
            notifier,
            identities,
        }
    }

    /// Receive and handle datagrams until `continuation` says stop.
    ///
    /// Only receive failures end the loop; per-event errors are logged.
    pub async fn run<S, C>(&self, source: &mut S, mut continuation: C) -> Result<(), ListenError>
    where
        S: DatagramSource + ?Sized,
        C: Continuation,
    {
        let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];

        while continuation.proceed() {
            let (len, peer) = source
                .recv_datagram(&mut buf)
                .await
                .map_err(ListenError::Receive)?;
            crate::metrics::datagram_received();
            tracing::debug!(%peer, bytes = len, "Datagram received");

            match self.handle_datagram(&buf[..len]).await {
                Ok(EventOutcome::Ignored { phase, status }) => {
                    tracing::debug!(%phase, %status, "Ignoring build notification");
                }
                Ok(EventOutcome::Unattributed { url }) => {
                    tracing::info!(%url, "Build broke but no team member matched");
                }
                Ok(EventOutcome::Notified { breaker, handle }) => {
                    tracing::info!(%breaker, %handle, "Build break handled");
                }
                Err(e) => {
                    crate::metrics::event_error(e.category());
                    tracing::warn!(category = e.category(), "Dropping build notification: {e}");
                }
            }
        }

        Ok(())
    }

    /// Process one datagram payload.
    pub async fn handle_datagram(&self, payload: &[u8]) -> Result<EventOutcome, EventError> {
        let notification = BuildNotification::from_slice(payload)?;
        let phase = notification.build.phase.to_uppercase();
        let status = notification.build.status.to_uppercase();
        crate::metrics::build_seen(&phase, &status);

        if !notification.is_build_break() {
            return Ok(EventOutcome::Ignored { phase, status });
        }

        crate::metrics::build_break();
        let url = notification.build.full_url.clone();
        tracing::info!(
            %url,
            job = notification.name.as_deref().unwrap_or(""),
            number = ?notification.build.number,
            %status,
            "Build broke"
        );

        let breaker = match self.resolver.resolve(&url).await? {
            Some(breaker) => breaker,
            None => {
                crate::metrics::unattributed_break();
                return Ok(EventOutcome::Unattributed { url });
            }
        };

        let handle = self.identities.handle_for(&breaker).to_string();
        self.notifier.notify(&handle, &notification).await?;
        crate::metrics::breaker_notified();

        Ok(EventOutcome::Notified { breaker, handle })
    }
}
