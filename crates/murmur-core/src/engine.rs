//! The protocol engine: receive dispatch, discovery, send path, shutdown.
//!
//! Three logical tasks share the engine state:
//!
//! - **Receive** (background): blocks on the transport, decodes each
//!   datagram, and dispatches on its type. One malformed or malicious
//!   message never stops the loop; only a transport failure does.
//! - **Discovery** (background): rebroadcasts a JOIN announcement on a
//!   fixed period. This rebroadcast is the protocol's only loss-recovery
//!   mechanism: a dropped JOIN heals within one period.
//! - **Send** (foreground, driven by the caller): [`Engine::send_chat`]
//!   encrypts, signs, and broadcasts one line at a time.
//!
//! There are no per-peer handshake states. A peer's presence is a soft,
//! eventually-stale fact inferred from the most recent JOIN/LEAVE seen;
//! that simplicity/availability tradeoff is deliberate.
//!
//! Shutdown is explicit: a watch channel signals both background tasks,
//! a short grace period lets in-flight work drain, a best-effort LEAVE
//! goes out, and the transport is closed before the tasks are joined.

use crate::directory::PeerDirectory;
use crate::envelope::{Envelope, MessageType};
use crate::error::{EngineError, Result};
use crate::event::ChatEvent;
use crate::identity::Username;
use crate::DEFAULT_RECV_BUFFER_SIZE;
use murmur_crypto::aead::Nonce;
use murmur_crypto::signatures::{Signature, VerifyingKey};
use murmur_crypto::GroupCrypto;
use murmur_transport::{Transport, TransportError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Period between JOIN rebroadcasts
    pub announce_interval: Duration,
    /// Buffer size for inbound datagrams
    pub recv_buffer_size: usize,
    /// How long shutdown waits before the departure notice goes out
    pub shutdown_grace: Duration,
    /// Capacity of the surfaced event channel
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            announce_interval: Duration::from_secs(3),
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            shutdown_grace: Duration::from_secs(1),
            event_buffer: 64,
        }
    }
}

struct EngineInner {
    transport: Arc<dyn Transport>,
    crypto: Arc<GroupCrypto>,
    directory: PeerDirectory,
    username: Username,
    config: EngineConfig,
    events: mpsc::Sender<ChatEvent>,
    shutdown: watch::Sender<bool>,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// The MURMUR protocol engine.
///
/// Cheap to clone; clones share all state.
///
/// # Example
///
/// ```no_run
/// use murmur_core::{Engine, EngineConfig, Username};
/// use murmur_crypto::GroupCrypto;
/// use murmur_crypto::aead::AeadKey;
/// use murmur_transport::{MulticastTransport, TransportConfig};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport =
///     MulticastTransport::join("239.255.42.7".parse()?, 50407, &TransportConfig::default())?;
/// let crypto = GroupCrypto::with_fresh_identity(AeadKey::from_hex("…")?);
///
/// let (engine, mut events) = Engine::new(
///     Arc::new(transport),
///     Arc::new(crypto),
///     Username::parse("alice")?,
///     EngineConfig::default(),
/// );
/// engine.start().await?;
/// engine.send_chat("hello everyone").await?;
/// engine.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine and the event stream it reports through.
    ///
    /// The peer directory starts empty; every run starts from zero trust.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        crypto: Arc<GroupCrypto>,
        username: Username,
        config: EngineConfig,
    ) -> (Self, mpsc::Receiver<ChatEvent>) {
        let (events, event_rx) = mpsc::channel(config.event_buffer);
        let (shutdown, _) = watch::channel(false);
        let inner = Arc::new(EngineInner {
            transport,
            crypto,
            directory: PeerDirectory::new(),
            username,
            config,
            events,
            shutdown,
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        });
        (Self { inner }, event_rx)
    }

    /// The local username
    #[must_use]
    pub fn username(&self) -> &Username {
        &self.inner.username
    }

    /// The trust map of currently known peers
    #[must_use]
    pub fn directory(&self) -> &PeerDirectory {
        &self.inner.directory
    }

    /// Spawn the receive and discovery background tasks.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyRunning`] on a second call.
    pub async fn start(&self) -> Result<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }

        tracing::info!(username = %self.inner.username, "starting protocol engine");

        let receive = tokio::spawn(receive_loop(
            Arc::clone(&self.inner),
            self.inner.shutdown.subscribe(),
        ));
        let discovery = tokio::spawn(discovery_loop(
            Arc::clone(&self.inner),
            self.inner.shutdown.subscribe(),
        ));

        let mut tasks = self.inner.tasks.lock().await;
        tasks.push(receive);
        tasks.push(discovery);
        Ok(())
    }

    /// Encrypt, sign, and broadcast one chat line.
    ///
    /// The line goes out as `"<username>: <text>"`, signed over the
    /// plaintext so receivers can verify after decrypting.
    ///
    /// # Errors
    ///
    /// Returns an error if sealing or the local send fails. Network loss
    /// past the local socket is silent and unrecoverable by design.
    pub async fn send_chat(&self, text: &str) -> Result<()> {
        let line = format!("{}: {}", self.inner.username, text);
        let sealed = self.inner.crypto.seal(line.as_bytes(), true)?;
        let envelope = Envelope::chat(
            sealed.ciphertext,
            sealed.nonce.as_bytes().to_vec(),
            sealed.signature.map(|s| s.as_bytes().to_vec()),
        );
        self.inner.transport.send(&envelope.encode()?).await?;
        Ok(())
    }

    /// Gracefully stop the engine.
    ///
    /// Signals both background tasks, waits the configured grace period,
    /// sends a best-effort LEAVE naming the local username, closes the
    /// transport, and joins the tasks. Idempotent.
    ///
    /// # Errors
    ///
    /// Currently infallible in practice; failures of the best-effort
    /// LEAVE and transport close are logged, not returned.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!("shutting down protocol engine");
        let _ = self.inner.shutdown.send(true);
        tokio::time::sleep(self.inner.config.shutdown_grace).await;

        if let Err(e) = self.send_leave().await {
            tracing::warn!(error = %e, "best-effort departure notice failed");
        }
        let _ = self.inner.transport.close().await;

        let mut tasks = self.inner.tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
        Ok(())
    }

    async fn send_leave(&self) -> Result<()> {
        let envelope = Envelope::leave(self.inner.username.as_str());
        self.inner.transport.send(&envelope.encode()?).await?;
        Ok(())
    }
}

impl EngineInner {
    /// Decode one datagram and dispatch on its type.
    ///
    /// Errors returned here are per-message: the caller logs and moves on.
    async fn handle_datagram(&self, data: &[u8]) -> Result<()> {
        let envelope = Envelope::decode(data)?;
        match envelope.message_type {
            MessageType::Chat => self.handle_chat(envelope).await,
            MessageType::Join => self.handle_join(envelope).await,
            MessageType::Leave => self.handle_leave(envelope).await,
        }
    }

    async fn handle_chat(&self, envelope: Envelope) -> Result<()> {
        let nonce = Nonce::from_slice(&envelope.nonce)?;
        let plaintext = self.crypto.open(&envelope.body, &nonce)?;
        let Ok(line) = String::from_utf8(plaintext) else {
            tracing::debug!("dropping chat with non-UTF-8 plaintext");
            return Ok(());
        };
        let Some((sender, text)) = line.split_once(": ") else {
            tracing::debug!("dropping chat without sender prefix");
            return Ok(());
        };
        if sender == self.username.as_str() {
            // multicast loops our own packets back to us
            return Ok(());
        }
        let Some(public_key) = self.directory.lookup(sender) else {
            // expected early in a session, before discovery catches up
            tracing::trace!(sender, "chat from unknown peer dropped");
            return Ok(());
        };
        let Ok(signature) = Signature::from_slice(&envelope.auth) else {
            tracing::warn!(sender, "dropping chat with malformed signature");
            return Ok(());
        };
        if !GroupCrypto::verify(&public_key, &signature, line.as_bytes()) {
            tracing::warn!(sender, "dropping chat that failed signature verification");
            return Ok(());
        }
        self.emit(ChatEvent::Message {
            sender: sender.to_owned(),
            text: text.to_owned(),
        })
        .await;
        Ok(())
    }

    async fn handle_join(&self, envelope: Envelope) -> Result<()> {
        let nonce = Nonce::from_slice(&envelope.nonce)?;
        let name_bytes = self.crypto.open(&envelope.body, &nonce)?;
        let Ok(username) = String::from_utf8(name_bytes) else {
            tracing::debug!("dropping announcement with non-UTF-8 username");
            return Ok(());
        };
        if username == self.username.as_str() {
            // our own rebroadcast; the directory never holds the local identity
            return Ok(());
        }

        let key_nonce = Nonce::from_slice(&envelope.auth_nonce)?;
        let key_bytes = self.crypto.open(&envelope.auth, &key_nonce)?;
        let public_key = VerifyingKey::from_slice(&key_bytes)?;

        if self.directory.add(&username, public_key) {
            tracing::info!(%username, "peer joined");
            self.emit(ChatEvent::PeerJoined(username)).await;
        } else {
            // established trust is immutable for the session; later
            // announcements are unauthenticated and ignored
            tracing::trace!(%username, "announcement for known peer ignored");
        }
        Ok(())
    }

    async fn handle_leave(&self, envelope: Envelope) -> Result<()> {
        let Ok(username) = String::from_utf8(envelope.body) else {
            tracing::debug!("dropping departure notice with non-UTF-8 username");
            return Ok(());
        };
        if username == self.username.as_str() {
            return Ok(());
        }
        if self.directory.remove(&username) {
            tracing::info!(%username, "peer left");
            self.emit(ChatEvent::PeerLeft(username)).await;
        }
        Ok(())
    }

    /// Broadcast the JOIN announcement: encrypted username + encrypted
    /// public key, both unsigned (the recipient learns the key from the
    /// message itself, so there is nothing to counter-sign yet).
    async fn announce(&self) -> Result<()> {
        let name = self.crypto.seal(self.username.as_str().as_bytes(), false)?;
        let key = self
            .crypto
            .seal(&self.crypto.public_key().to_bytes(), false)?;
        let envelope = Envelope::join(
            name.ciphertext,
            name.nonce.as_bytes().to_vec(),
            key.ciphertext,
            key.nonce.as_bytes().to_vec(),
        );
        self.transport.send(&envelope.encode()?).await?;
        Ok(())
    }

    async fn emit(&self, event: ChatEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("event receiver dropped, discarding event");
        }
    }
}

async fn receive_loop(inner: Arc<EngineInner>, mut shutdown: watch::Receiver<bool>) {
    let mut buf = vec![0u8; inner.config.recv_buffer_size];
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::debug!("receive loop stopping on shutdown signal");
                break;
            }
            result = inner.transport.recv(&mut buf) => match result {
                Ok(len) => {
                    if let Err(error) = inner.handle_datagram(&buf[..len]).await {
                        match error {
                            EngineError::Codec(e) => {
                                tracing::debug!(error = %e, "dropping malformed datagram");
                            }
                            EngineError::Crypto(e) => {
                                tracing::debug!(error = %e, "dropping undecipherable datagram");
                            }
                            e => tracing::warn!(error = %e, "failed to process datagram"),
                        }
                    }
                }
                Err(TransportError::Closed) => {
                    tracing::debug!("transport closed, receive loop stopping");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "transport receive failed, receive loop stopping");
                    break;
                }
            }
        }
    }
}

async fn discovery_loop(inner: Arc<EngineInner>, mut shutdown: watch::Receiver<bool>) {
    loop {
        match inner.announce().await {
            Ok(()) => tracing::trace!("announced presence to group"),
            Err(EngineError::Transport(TransportError::Closed)) => {
                tracing::debug!("transport closed, discovery loop stopping");
                break;
            }
            Err(e) => tracing::warn!(error = %e, "discovery announcement failed"),
        }
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::debug!("discovery loop stopping on shutdown signal");
                break;
            }
            _ = tokio::time::sleep(inner.config.announce_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use murmur_crypto::aead::AeadKey;
    use murmur_transport::TransportResult;
    use rand_core::OsRng;
    use std::net::SocketAddr;

    /// Transport that swallows sends and never produces datagrams;
    /// dispatch tests feed the engine directly.
    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&self, buf: &[u8]) -> TransportResult<usize> {
            Ok(buf.len())
        }

        async fn recv(&self, _buf: &mut [u8]) -> TransportResult<usize> {
            std::future::pending().await
        }

        fn local_addr(&self) -> TransportResult<SocketAddr> {
            Ok("127.0.0.1:0".parse().expect("static addr"))
        }

        async fn close(&self) -> TransportResult<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    struct Peer {
        crypto: GroupCrypto,
        name: &'static str,
    }

    impl Peer {
        fn new(group_key: &AeadKey, name: &'static str) -> Self {
            Self {
                crypto: GroupCrypto::with_fresh_identity(group_key.clone()),
                name,
            }
        }

        fn join_bytes(&self) -> Vec<u8> {
            let name = self.crypto.seal(self.name.as_bytes(), false).unwrap();
            let key = self
                .crypto
                .seal(&self.crypto.public_key().to_bytes(), false)
                .unwrap();
            Envelope::join(
                name.ciphertext,
                name.nonce.as_bytes().to_vec(),
                key.ciphertext,
                key.nonce.as_bytes().to_vec(),
            )
            .encode()
            .unwrap()
        }

        fn chat_bytes(&self, text: &str) -> Vec<u8> {
            let line = format!("{}: {}", self.name, text);
            let sealed = self.crypto.seal(line.as_bytes(), true).unwrap();
            Envelope::chat(
                sealed.ciphertext,
                sealed.nonce.as_bytes().to_vec(),
                sealed.signature.map(|s| s.as_bytes().to_vec()),
            )
            .encode()
            .unwrap()
        }

        fn leave_bytes(&self) -> Vec<u8> {
            Envelope::leave(self.name).encode().unwrap()
        }
    }

    fn engine_with_key(group_key: &AeadKey) -> (Engine, mpsc::Receiver<ChatEvent>) {
        Engine::new(
            Arc::new(NullTransport),
            Arc::new(GroupCrypto::with_fresh_identity(group_key.clone())),
            Username::parse("local").unwrap(),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_join_adds_peer_and_emits_event() {
        let group_key = AeadKey::generate(&mut OsRng);
        let (engine, mut events) = engine_with_key(&group_key);
        let alice = Peer::new(&group_key, "alice");

        engine.inner.handle_datagram(&alice.join_bytes()).await.unwrap();

        assert_eq!(
            engine.directory().lookup("alice"),
            Some(alice.crypto.public_key())
        );
        assert_eq!(
            events.try_recv().unwrap(),
            ChatEvent::PeerJoined("alice".into())
        );
    }

    #[tokio::test]
    async fn test_duplicate_join_keeps_first_key() {
        let group_key = AeadKey::generate(&mut OsRng);
        let (engine, mut events) = engine_with_key(&group_key);
        let alice = Peer::new(&group_key, "alice");
        let imposter = Peer::new(&group_key, "alice");

        engine.inner.handle_datagram(&alice.join_bytes()).await.unwrap();
        let _ = events.try_recv();

        engine
            .inner
            .handle_datagram(&imposter.join_bytes())
            .await
            .unwrap();

        assert_eq!(
            engine.directory().lookup("alice"),
            Some(alice.crypto.public_key())
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_own_join_never_enters_directory() {
        let group_key = AeadKey::generate(&mut OsRng);
        let (engine, mut events) = engine_with_key(&group_key);
        // another process announcing our username still names the local
        // identity, which the directory must never contain
        let echo = Peer::new(&group_key, "local");

        engine.inner.handle_datagram(&echo.join_bytes()).await.unwrap();

        assert!(engine.directory().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_chat_from_known_peer_is_surfaced() {
        let group_key = AeadKey::generate(&mut OsRng);
        let (engine, mut events) = engine_with_key(&group_key);
        let alice = Peer::new(&group_key, "alice");

        engine.inner.handle_datagram(&alice.join_bytes()).await.unwrap();
        let _ = events.try_recv();

        engine
            .inner
            .handle_datagram(&alice.chat_bytes("hello"))
            .await
            .unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            ChatEvent::Message {
                sender: "alice".into(),
                text: "hello".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_chat_before_join_is_dropped() {
        let group_key = AeadKey::generate(&mut OsRng);
        let (engine, mut events) = engine_with_key(&group_key);
        let alice = Peer::new(&group_key, "alice");

        engine
            .inner
            .handle_datagram(&alice.chat_bytes("too early"))
            .await
            .unwrap();

        assert!(events.try_recv().is_err());
        assert!(engine.directory().is_empty());
    }

    #[tokio::test]
    async fn test_chat_with_forged_signature_is_dropped() {
        let group_key = AeadKey::generate(&mut OsRng);
        let (engine, mut events) = engine_with_key(&group_key);
        let alice = Peer::new(&group_key, "alice");
        // mallory claims to be alice but signs with a different key
        let mallory = Peer::new(&group_key, "alice");

        engine.inner.handle_datagram(&alice.join_bytes()).await.unwrap();
        let _ = events.try_recv();

        engine
            .inner
            .handle_datagram(&mallory.chat_bytes("trust me"))
            .await
            .unwrap();

        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_own_chat_is_suppressed() {
        let group_key = AeadKey::generate(&mut OsRng);
        let (engine, mut events) = engine_with_key(&group_key);
        let echo = Peer::new(&group_key, "local");

        engine
            .inner
            .handle_datagram(&echo.chat_bytes("looped back"))
            .await
            .unwrap();

        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_removes_peer_and_emits_event() {
        let group_key = AeadKey::generate(&mut OsRng);
        let (engine, mut events) = engine_with_key(&group_key);
        let alice = Peer::new(&group_key, "alice");

        engine.inner.handle_datagram(&alice.join_bytes()).await.unwrap();
        let _ = events.try_recv();

        engine.inner.handle_datagram(&alice.leave_bytes()).await.unwrap();

        assert!(engine.directory().is_empty());
        assert_eq!(
            events.try_recv().unwrap(),
            ChatEvent::PeerLeft("alice".into())
        );
    }

    #[tokio::test]
    async fn test_leave_for_unknown_peer_is_silent() {
        let group_key = AeadKey::generate(&mut OsRng);
        let (engine, mut events) = engine_with_key(&group_key);
        let stranger = Peer::new(&group_key, "stranger");

        engine
            .inner
            .handle_datagram(&stranger.leave_bytes())
            .await
            .unwrap();

        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_chat_after_leave_is_dropped() {
        let group_key = AeadKey::generate(&mut OsRng);
        let (engine, mut events) = engine_with_key(&group_key);
        let alice = Peer::new(&group_key, "alice");

        engine.inner.handle_datagram(&alice.join_bytes()).await.unwrap();
        engine.inner.handle_datagram(&alice.leave_bytes()).await.unwrap();
        let _ = events.try_recv();
        let _ = events.try_recv();

        // replayed or impostor chat after departure: no longer trusted
        engine
            .inner
            .handle_datagram(&alice.chat_bytes("ghost"))
            .await
            .unwrap();

        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_foreign_group_key_is_dropped() {
        let group_key = AeadKey::generate(&mut OsRng);
        let (engine, mut events) = engine_with_key(&group_key);
        let outsider = Peer::new(&AeadKey::generate(&mut OsRng), "outsider");

        let result = engine.inner.handle_datagram(&outsider.join_bytes()).await;

        assert!(matches!(result, Err(EngineError::Crypto(_))));
        assert!(engine.directory().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_datagram_is_a_codec_error() {
        let group_key = AeadKey::generate(&mut OsRng);
        let (engine, _events) = engine_with_key(&group_key);

        let result = engine.inner.handle_datagram(&[0xFF, 0xFF, 0xFF]).await;
        assert!(matches!(result, Err(EngineError::Codec(_))));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let group_key = AeadKey::generate(&mut OsRng);
        let (engine, _events) = engine_with_key(&group_key);

        engine.start().await.unwrap();
        assert!(matches!(
            engine.start().await,
            Err(EngineError::AlreadyRunning)
        ));

        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_before_start_is_noop() {
        let group_key = AeadKey::generate(&mut OsRng);
        let (engine, _events) = engine_with_key(&group_key);
        engine.shutdown().await.unwrap();
    }
}
