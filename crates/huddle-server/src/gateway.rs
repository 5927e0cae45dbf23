//! Session gateway.
//!
//! Turns client requests into broker and membership operations. Each
//! connected client is represented by a [`Session`] owned by its connection
//! task; the gateway holds only shared state. Connect and disconnect are
//! explicit calls, and disconnect undoes everything the session did: its
//! subscriptions are dropped and every room it joined is left, unless
//! another open session announced the same user in that room.

use crate::config::Config;
use crate::metrics;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use huddle_core::{BrokerError, ConnectionId, LobbyError, MembershipManager, TopicBroker};
use huddle_protocol::{
    codes, AddressError, Action, ChatEvent, Destination, Encoding, Frame, FrameType, Topic,
    VersionMismatch, PROTOCOL_VERSION,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Per-request failures, each reported to the client as an error frame.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("Subscribe failed: {0}")]
    Subscribe(#[from] BrokerError),

    #[error("Not subscribed to {0}")]
    NotSubscribed(Topic),

    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error("Invalid event: {0}")]
    InvalidEvent(&'static str),

    #[error(transparent)]
    UnsupportedVersion(#[from] VersionMismatch),

    #[error("Unexpected {0:?} frame from client")]
    UnexpectedFrame(FrameType),
}

impl GatewayError {
    /// Wire error code.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            GatewayError::Address(_) | GatewayError::UnexpectedFrame(_) => codes::INVALID_FRAME,
            GatewayError::Subscribe(_) => codes::SUBSCRIBE_FAILED,
            GatewayError::NotSubscribed(_) => codes::NOT_MEMBER,
            GatewayError::Lobby(err) => match err {
                LobbyError::RoomNotFound(_) => codes::ROOM_NOT_FOUND,
                LobbyError::RoomFull { .. } => codes::ROOM_FULL,
                LobbyError::NotMember { .. } => codes::NOT_MEMBER,
                LobbyError::InvalidUsername(_) => codes::INVALID_USERNAME,
                LobbyError::InvalidName(_) | LobbyError::InvalidCapacity { .. } => {
                    codes::INVALID_FRAME
                }
            },
            GatewayError::InvalidEvent(_) => codes::INVALID_EVENT,
            GatewayError::UnsupportedVersion(_) => codes::UNSUPPORTED_VERSION,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            GatewayError::Address(_) => "address",
            GatewayError::Subscribe(_) => "subscribe",
            GatewayError::NotSubscribed(_) => "not_subscribed",
            GatewayError::Lobby(err) => err.code(),
            GatewayError::InvalidEvent(_) => "invalid_event",
            GatewayError::UnsupportedVersion(_) => "unsupported_version",
            GatewayError::UnexpectedFrame(_) => "unexpected_frame",
        }
    }
}

/// Gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Heartbeat interval advertised in the Connected frame, in milliseconds.
    pub heartbeat_ms: u32,
    /// Outbound queue length per session.
    pub outbound_queue: usize,
    /// Maximum event content length in bytes.
    pub max_content_length: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for GatewayConfig {
    fn from(config: &Config) -> Self {
        Self {
            heartbeat_ms: u32::try_from(config.heartbeat.interval_ms).unwrap_or(u32::MAX),
            outbound_queue: config.limits.outbound_queue.max(1),
            max_content_length: config.limits.max_content_length,
        }
    }
}

/// State of one connected client.
pub struct Session {
    id: ConnectionId,
    encoding: Encoding,
    outbound: mpsc::Sender<Frame>,
    forwarders: HashMap<Topic, JoinHandle<()>>,
    /// Rooms joined through this session, left again on disconnect.
    joined: Vec<(Topic, String)>,
}

impl Session {
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Encoding used for frames sent to this client.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Follow the encoding of the client's latest frame.
    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
    }

    /// Topics with a live forwarder.
    pub fn subscriptions(&self) -> impl Iterator<Item = &Topic> {
        self.forwarders.keys()
    }

    /// (topic, username) pairs joined through this session.
    #[must_use]
    pub fn joined(&self) -> &[(Topic, String)] {
        &self.joined
    }

    fn remember_join(&mut self, topic: Topic, username: &str) -> bool {
        if self
            .joined
            .iter()
            .any(|(t, u)| *t == topic && u == username)
        {
            return false;
        }
        self.joined.push((topic, username.to_string()));
        true
    }

    fn forget_join(&mut self, topic: &Topic, username: &str) {
        self.joined.retain(|(t, u)| !(t == topic && u == username));
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for (_, handle) in self.forwarders.drain() {
            handle.abort();
        }
    }
}

/// The session gateway.
pub struct SessionGateway {
    members: Arc<MembershipManager>,
    config: GatewayConfig,
    /// Open sessions plus slots reserved for pending upgrades.
    connections: AtomicUsize,
    /// Number of open sessions that announced each (topic, username).
    holders: DashMap<(Topic, String), usize>,
}

impl SessionGateway {
    #[must_use]
    pub fn new(members: Arc<MembershipManager>, config: GatewayConfig) -> Self {
        Self {
            members,
            config,
            connections: AtomicUsize::new(0),
            holders: DashMap::new(),
        }
    }

    fn broker(&self) -> &TopicBroker {
        self.members.broker()
    }

    /// Number of open sessions.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    /// Reserve a connection slot ahead of a transport upgrade.
    ///
    /// Returns `false` once `limit` sessions are open or reserved. A
    /// reservation is consumed by [`on_connect_reserved`] or handed back
    /// with [`release_reservation`].
    ///
    /// [`on_connect_reserved`]: SessionGateway::on_connect_reserved
    /// [`release_reservation`]: SessionGateway::release_reservation
    pub fn try_reserve(&self, limit: usize) -> bool {
        self.connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (open < limit).then_some(open + 1)
            })
            .is_ok()
    }

    /// Hand back a slot whose upgrade never completed.
    pub fn release_reservation(&self) {
        self.connections.fetch_sub(1, Ordering::AcqRel);
    }

    /// Open a session.
    ///
    /// Returns the session and the receiving end of its outbound queue, which
    /// the caller drains onto the transport.
    pub fn on_connect(&self) -> (Session, mpsc::Receiver<Frame>) {
        self.connections.fetch_add(1, Ordering::AcqRel);
        self.open_session()
    }

    /// Open a session on a slot taken by [`try_reserve`](SessionGateway::try_reserve).
    pub fn on_connect_reserved(&self) -> (Session, mpsc::Receiver<Frame>) {
        self.open_session()
    }

    fn open_session(&self) -> (Session, mpsc::Receiver<Frame>) {
        let (outbound, rx) = mpsc::channel(self.config.outbound_queue);
        let session = Session {
            id: ConnectionId::generate(),
            encoding: Encoding::default(),
            outbound,
            forwarders: HashMap::new(),
            joined: Vec::new(),
        };
        debug!(connection = %session.id, open = self.connection_count(), "Session opened");
        (session, rx)
    }

    /// Subscribe the session to a topic.
    ///
    /// Events on the topic are forwarded to the session's outbound queue
    /// until it unsubscribes or disconnects. The room behind a `room/{id}`
    /// topic does not have to exist.
    ///
    /// # Errors
    ///
    /// Fails on a malformed topic or when the broker refuses the subscription.
    pub fn on_subscribe_request(
        &self,
        session: &mut Session,
        topic: &str,
    ) -> Result<Topic, GatewayError> {
        let topic: Topic = topic.parse()?;
        let rx = self.broker().subscribe(session.id.as_str(), &topic)?;

        let handle = tokio::spawn(forward(
            session.id.clone(),
            topic.clone(),
            rx,
            session.outbound.clone(),
        ));
        session.forwarders.insert(topic.clone(), handle);

        metrics::record_subscription();
        metrics::set_active_topics(self.broker().stats().topic_count);
        debug!(connection = %session.id, topic = %topic, "Subscribed");
        Ok(topic)
    }

    /// Drop the session's subscription to a topic.
    ///
    /// # Errors
    ///
    /// Fails on a malformed topic or when the session is not subscribed.
    pub fn on_unsubscribe_request(
        &self,
        session: &mut Session,
        topic: &str,
    ) -> Result<Topic, GatewayError> {
        let topic: Topic = topic.parse()?;
        if let Some(handle) = session.forwarders.remove(&topic) {
            handle.abort();
        }
        if !self.broker().unsubscribe(session.id.as_str(), &topic) {
            return Err(GatewayError::NotSubscribed(topic));
        }

        metrics::set_active_topics(self.broker().stats().topic_count);
        debug!(connection = %session.id, topic = %topic, "Unsubscribed");
        Ok(topic)
    }

    /// Announce `username` in a room.
    ///
    /// Registered rooms go through the membership manager, which enforces
    /// capacity and broadcasts JOIN. The public room has no registry entry,
    /// so the gateway broadcasts JOIN itself. Returns `false` when the user
    /// was already in the room.
    ///
    /// The session becomes one of the holders of the membership. It is only
    /// given up on disconnect once no other open session holds it.
    ///
    /// # Errors
    ///
    /// `InvalidUsername`, `RoomNotFound`, or `RoomFull`.
    pub fn on_join_request(
        &self,
        session: &mut Session,
        topic: Topic,
        username: &str,
    ) -> Result<bool, GatewayError> {
        let result = match &topic {
            Topic::Public => huddle_core::membership::validate_username(username)
                .map(|()| self.join_public(session, username))
                .map_err(GatewayError::from),
            Topic::Room(room_id) => self.join_room(session, &topic, room_id, username),
        };

        match &result {
            Ok(is_new) => {
                metrics::record_join(if *is_new { "joined" } else { "already_member" });
                info!(connection = %session.id, topic = %topic, user = %username, is_new, "Join");
            }
            Err(err) => metrics::record_join(err.kind()),
        }
        result
    }

    fn join_public(&self, session: &mut Session, username: &str) -> bool {
        if !session.remember_join(Topic::Public, username) {
            return false;
        }
        let mut holders = self
            .holders
            .entry((Topic::Public, username.to_string()))
            .or_insert(0);
        *holders += 1;
        let is_new = *holders == 1;
        if is_new {
            self.broker().publish(
                &Topic::Public,
                ChatEvent::join(username),
                Some(session.id.as_str()),
            );
        }
        is_new
    }

    fn join_room(
        &self,
        session: &mut Session,
        topic: &Topic,
        room_id: &str,
        username: &str,
    ) -> Result<bool, GatewayError> {
        // Hold before joining so a concurrent disconnect cannot leave in between
        let claimed = session.remember_join(topic.clone(), username);
        if claimed {
            *self
                .holders
                .entry((topic.clone(), username.to_string()))
                .or_insert(0) += 1;
        }

        match self.members.join(room_id, username) {
            Ok(receipt) => Ok(receipt.is_new),
            Err(err) => {
                if claimed {
                    session.forget_join(topic, username);
                    self.release(topic, username, || {});
                }
                Err(err.into())
            }
        }
    }

    /// Drop one holder of a membership, running `on_last` under the entry
    /// lock when it was the last one. Returns whether it was.
    fn release(&self, topic: &Topic, username: &str, on_last: impl FnOnce()) -> bool {
        match self.holders.entry((topic.clone(), username.to_string())) {
            Entry::Occupied(mut held) => {
                *held.get_mut() -= 1;
                if *held.get() > 0 {
                    return false;
                }
                on_last();
                held.remove();
                true
            }
            Entry::Vacant(_) => {
                on_last();
                true
            }
        }
    }

    fn end_membership(&self, topic: &Topic, username: &str) {
        match topic {
            Topic::Public => {
                self.broker()
                    .publish(topic, ChatEvent::leave(username), None);
            }
            Topic::Room(room_id) => match self.members.leave(room_id, username) {
                Ok(_) => {}
                Err(LobbyError::NotMember { .. } | LobbyError::RoomNotFound(_)) => {
                    debug!(room = %room_id, user = %username, "Membership already gone");
                }
                Err(err) => {
                    warn!(room = %room_id, user = %username, error = %err, "Leave on disconnect failed");
                }
            },
        }
    }

    /// Publish a client event to a topic.
    ///
    /// Only CHAT, SYSTEM and CHALLENGE may be published; JOIN and LEAVE come
    /// from membership changes. Returns the number of subscribers reached.
    ///
    /// # Errors
    ///
    /// `InvalidEvent` for a disallowed kind, a blank sender, or oversized
    /// content.
    pub fn on_publish_request(
        &self,
        session: &Session,
        topic: Topic,
        event: ChatEvent,
    ) -> Result<usize, GatewayError> {
        if !event.kind.is_client_publishable() {
            return Err(GatewayError::InvalidEvent(
                "JOIN and LEAVE are sent by the server",
            ));
        }
        if event.sender.trim().is_empty() {
            return Err(GatewayError::InvalidEvent("sender is required"));
        }
        if event.content_len() > self.config.max_content_length {
            return Err(GatewayError::InvalidEvent("content too long"));
        }

        let kind = event.kind;
        let recipients = self
            .broker()
            .publish(&topic, event, Some(session.id.as_str()));
        trace!(connection = %session.id, topic = %topic, kind = %kind, recipients, "Published");
        Ok(recipients)
    }

    /// Tear a session down.
    ///
    /// Forwarders stop and all subscriptions are dropped. Every room the
    /// session joined is left with a LEAVE broadcast once no other open
    /// session holds the same user there. A membership already ended
    /// elsewhere (REST leave, room deleted) is skipped.
    pub fn on_disconnect(&self, mut session: Session) {
        for (_, handle) in session.forwarders.drain() {
            handle.abort();
        }
        let dropped = self.broker().unsubscribe_all(session.id.as_str());

        for (topic, username) in std::mem::take(&mut session.joined) {
            let last = self.release(&topic, &username, || self.end_membership(&topic, &username));
            if !last {
                debug!(topic = %topic, user = %username, "Membership still held by another session");
            }
        }

        let open = self
            .connections
            .fetch_sub(1, Ordering::AcqRel)
            .saturating_sub(1);
        metrics::set_active_topics(self.broker().stats().topic_count);
        debug!(
            connection = %session.id,
            subscriptions = dropped.len(),
            open,
            "Session closed"
        );
    }

    /// Dispatch a decoded client frame, returning the reply to send, if any.
    pub fn handle_frame(&self, session: &mut Session, frame: Frame) -> Option<Frame> {
        match frame {
            Frame::Connect { version } => Some(match PROTOCOL_VERSION.negotiate(version) {
                Ok(agreed) => {
                    Frame::connected(session.id.as_str(), agreed, self.config.heartbeat_ms)
                }
                Err(mismatch) => self.reject(session, 0, &mismatch.into()),
            }),

            Frame::Subscribe { id, topic } => {
                Some(match self.on_subscribe_request(session, &topic) {
                    Ok(_) => Frame::ack(id),
                    Err(err) => self.reject(session, id, &err),
                })
            }

            Frame::Unsubscribe { id, topic } => {
                Some(match self.on_unsubscribe_request(session, &topic) {
                    Ok(_) => Frame::ack(id),
                    Err(err) => self.reject(session, id, &err),
                })
            }

            Frame::Send {
                id,
                destination,
                event,
            } => {
                let result = destination
                    .parse::<Destination>()
                    .map_err(GatewayError::from)
                    .and_then(|dest| match dest.action {
                        Action::AddUser => self
                            .on_join_request(session, dest.topic, &event.sender)
                            .map(|_| ()),
                        Action::SendMessage => self
                            .on_publish_request(session, dest.topic, event)
                            .map(|_| ()),
                    });

                match (result, id) {
                    (Ok(()), Some(id)) => Some(Frame::ack(id)),
                    (Ok(()), None) => None,
                    (Err(err), Some(id)) => Some(self.reject(session, id, &err)),
                    (Err(err), None) => {
                        self.reject(session, 0, &err);
                        None
                    }
                }
            }

            Frame::Ping { timestamp } => Some(Frame::pong(timestamp)),

            Frame::Pong { .. } => None,

            other @ (Frame::Connected { .. }
            | Frame::Event { .. }
            | Frame::Ack { .. }
            | Frame::Error { .. }) => {
                let err = GatewayError::UnexpectedFrame(other.frame_type());
                Some(self.reject(session, 0, &err))
            }
        }
    }

    fn reject(&self, session: &Session, id: u64, err: &GatewayError) -> Frame {
        warn!(connection = %session.id, request = id, error = %err, "Request rejected");
        metrics::record_error(err.kind());
        Frame::error(id, err.code(), err.to_string())
    }
}

/// Move deliveries from a topic ring into a session's outbound queue.
///
/// Never waits on a full queue: the event is dropped for this session only.
async fn forward(
    connection: ConnectionId,
    topic: Topic,
    mut rx: broadcast::Receiver<Arc<huddle_core::Delivery>>,
    outbound: mpsc::Sender<Frame>,
) {
    let topic_name = topic.to_string();
    loop {
        match rx.recv().await {
            Ok(delivery) => {
                let frame = Frame::event(topic_name.clone(), delivery.event.clone());
                match outbound.try_send(frame) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(connection = %connection, topic = %topic, "Outbound queue full, dropping event");
                        metrics::record_dropped(1);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(connection = %connection, topic = %topic, missed, "Subscriber lagged");
                metrics::record_dropped(missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    trace!(connection = %connection, topic = %topic, "Forwarder stopped");
}
