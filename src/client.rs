use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};

use crate::{
    config::Config,
    crypto::{self, CryptoError},
    protocol::{
        generate_message_id, qr, MediaType, MessagingClient, OutboundMessage, PairingChannel,
        PairingEvent, SendResponse, UploadResponse,
    },
    state::{SentMessage, SessionState},
    types::JID,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("device is not paired; log in first")]
    NotLoggedIn,
    #[error("client is not connected")]
    NotConnected,
    #[error("device is already paired")]
    AlreadyPaired,
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("stored device keys are corrupt: {0}")]
    CorruptKeys(#[from] hex::FromHexError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("failed to persist session: {0}")]
    Io(#[from] std::io::Error),
}

struct Inner {
    state: SessionState,
    connected: bool,
    /// Pairing channels opened while disconnected, served on the next connect.
    pending: Vec<mpsc::Sender<PairingEvent>>,
    /// Final event for running code rotations; set once pairing ends.
    rotation_end: watch::Sender<Option<PairingEvent>>,
}

impl Inner {
    fn start_pairing(&mut self, mut listeners: Vec<mpsc::Sender<PairingEvent>>) -> Result<(), ClientError> {
        let codes = qr::generate_codes(&self.state.keys.pairing_keys()?);
        let previous_ended = self.rotation_end.borrow().is_some();
        if previous_ended {
            self.rotation_end = watch::channel(None).0;
        }
        let mut end = self.rotation_end.subscribe();

        tokio::spawn(async move {
            for (index, code) in codes.into_iter().enumerate() {
                listeners.retain(|tx| !tx.is_closed());
                if listeners.is_empty() {
                    debug!("Pairing channels closed by receivers");
                    return;
                }
                let timeout = qr::code_timeout(index);
                for tx in &listeners {
                    let _ = tx.send(PairingEvent::Code { code: code.clone(), timeout }).await;
                }

                let ended = tokio::select! {
                    _ = tokio::time::sleep(timeout) => false,
                    _ = end.changed() => true,
                };
                if ended {
                    let event = end.borrow().as_ref().cloned();
                    if let Some(event) = event {
                        broadcast(&listeners, event).await;
                    }
                    return;
                }
            }
            broadcast(&listeners, PairingEvent::Timeout).await;
        });
        Ok(())
    }

    /// Stop code rotation and deliver `event` to every open pairing channel.
    fn finish_pairing(&mut self, event: PairingEvent) {
        for tx in self.pending.drain(..) {
            let _ = tx.try_send(event.clone());
        }
        self.rotation_end.send_replace(Some(event));
    }
}

async fn broadcast(listeners: &[mpsc::Sender<PairingEvent>], event: PairingEvent) {
    for tx in listeners {
        let _ = tx.send(event.clone()).await;
    }
}

/// File-backed client session.
///
/// Keeps the device identity and sent-message log in a JSON file, seals
/// uploads into the media directory and hands out pairing codes derived from
/// the stored device keys. Pairing completes through [`LocalClient::register`],
/// either on this instance or on another one sharing the session file.
///
/// Sealed media is removed once its message drops out of the sent log.
/// Uploads that are never sent stay in the media directory.
pub struct LocalClient {
    session_file: PathBuf,
    media_dir: PathBuf,
    inner: Mutex<Inner>,
}

impl LocalClient {
    /// Open the session stored at the configured path, creating a fresh
    /// unpaired device when none exists yet.
    pub fn open(config: &Config) -> Result<Self, ClientError> {
        let state = match SessionState::load(&config.session_file)? {
            Some(state) => {
                info!(
                    "Loaded session for {} from {}",
                    state.registered_jid.as_deref().unwrap_or("unpaired device"),
                    config.session_file.display()
                );
                state
            }
            None => {
                info!("No session at {}, creating a new device", config.session_file.display());
                SessionState::with_device_name(&config.device_name)
            }
        };
        // Fail at startup rather than on the first pairing attempt.
        state.keys.pairing_keys()?;

        Ok(Self {
            session_file: config.session_file.clone(),
            media_dir: config.media_dir(),
            inner: Mutex::new(Inner {
                state,
                connected: false,
                pending: Vec::new(),
                rotation_end: watch::channel(None).0,
            }),
        })
    }

    /// Record the paired account JID and persist the session.
    pub async fn register(&self, jid: &JID) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        inner.state.register(jid.to_string());
        inner.finish_pairing(PairingEvent::Success);
        self.save(&mut inner).await?;
        info!("Registered device as {jid}");
        Ok(())
    }

    /// Snapshot of the current session state.
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state.clone()
    }

    pub fn session_file(&self) -> &Path {
        &self.session_file
    }

    /// Adopt a registration another process wrote to the session file,
    /// e.g. `wa-gateway register` run next to a live server.
    fn sync_registration(&self, inner: &mut Inner) {
        if inner.state.is_registered() {
            return;
        }
        match SessionState::load(&self.session_file) {
            Ok(Some(stored)) => {
                if let Some(jid) = stored.registered_jid {
                    info!("Adopting registration {jid} from {}", self.session_file.display());
                    inner.state.register(jid);
                    inner.finish_pairing(PairingEvent::Success);
                }
            }
            Ok(None) => {}
            Err(err) => warn!("Cannot read {}: {err}", self.session_file.display()),
        }
    }

    /// Persist the session. An unregistered state never replaces a
    /// registered file.
    async fn save(&self, inner: &mut Inner) -> std::io::Result<()> {
        self.sync_registration(inner);
        inner.state.persist(&self.session_file).await
    }

    async fn remove_media(&self, handles: impl Iterator<Item = String>) {
        for handle in handles {
            let path = self.media_dir.join(&handle);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("Pruned media {}", path.display()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!("Cannot prune media {}: {err}", path.display()),
            }
        }
    }
}

#[async_trait]
impl MessagingClient for LocalClient {
    async fn connect(&self) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        if inner.connected {
            return Ok(());
        }
        self.sync_registration(&mut inner);
        inner.connected = true;
        info!("Connected as {}", inner.state.registered_jid.as_deref().unwrap_or("unpaired device"));

        if !inner.state.is_registered() && !inner.pending.is_empty() {
            let listeners = std::mem::take(&mut inner.pending);
            inner.start_pairing(listeners)?;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        inner.connected = false;
        if !inner.state.is_registered() {
            inner.finish_pairing(PairingEvent::Error("client disconnected".into()));
        }
        self.save(&mut inner).await?;
        info!("Disconnected, session saved to {}", self.session_file.display());
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.inner.lock().await.connected
    }

    async fn has_identity(&self) -> bool {
        let mut inner = self.inner.lock().await;
        self.sync_registration(&mut inner);
        inner.state.is_registered()
    }

    async fn pairing_channel(&self) -> Result<PairingChannel, ClientError> {
        let mut inner = self.inner.lock().await;
        self.sync_registration(&mut inner);
        if inner.state.is_registered() {
            return Err(ClientError::AlreadyPaired);
        }

        let (tx, rx) = mpsc::channel(8);
        if inner.connected {
            // Connected but unpaired: this channel gets its own code rotation.
            inner.start_pairing(vec![tx])?;
        } else {
            inner.pending.push(tx);
        }
        Ok(rx)
    }

    async fn upload(
        &self,
        data: Vec<u8>,
        media_type: MediaType,
    ) -> Result<UploadResponse, ClientError> {
        if !self.is_connected().await {
            return Err(ClientError::NotConnected);
        }

        let sealed = crypto::seal_media(&data, media_type.app_info())?;
        let name = hex::encode(&sealed.file_enc_sha256);
        let path = self.media_dir.join(&name);

        tokio::fs::create_dir_all(&self.media_dir)
            .await
            .map_err(|e| ClientError::UploadFailed(e.to_string()))?;
        tokio::fs::write(&path, &sealed.ciphertext)
            .await
            .map_err(|e| ClientError::UploadFailed(e.to_string()))?;
        debug!("Stored {} byte {:?} upload at {}", data.len(), media_type, path.display());

        Ok(UploadResponse {
            url: format!("file://{}", path.display()),
            direct_path: format!("/media/{name}"),
            handle: name,
            media_key: sealed.media_key,
            file_enc_sha256: sealed.file_enc_sha256,
            file_sha256: sealed.file_sha256,
            file_length: data.len() as u64,
        })
    }

    async fn send(
        &self,
        to: &JID,
        message: &OutboundMessage,
        media_handle: Option<&str>,
    ) -> Result<SendResponse, ClientError> {
        let mut inner = self.inner.lock().await;
        self.sync_registration(&mut inner);
        if !inner.state.is_registered() {
            return Err(ClientError::NotLoggedIn);
        }
        if !inner.connected {
            return Err(ClientError::NotConnected);
        }
        if to.is_empty() {
            return Err(ClientError::SendFailed("recipient has no server".into()));
        }

        let ack = SendResponse {
            id: generate_message_id(),
            timestamp: Utc::now(),
            server_id: None,
        };
        let evicted = inner.state.record_sent(SentMessage {
            id: ack.id.clone(),
            to: to.to_string(),
            kind: message.kind().to_string(),
            body: message.body().to_string(),
            media_handle: media_handle.map(str::to_string),
            sent_at: ack.timestamp,
        });
        if let Err(err) = self.save(&mut inner).await {
            warn!("Message {} sent but session log not saved: {err}", ack.id);
        }
        self.remove_media(evicted.into_iter().filter_map(|sent| sent.media_handle))
            .await;

        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MAX_SENT_LOG;
    use std::time::Duration;

    fn client_in(dir: &Path) -> LocalClient {
        let config = Config::default().with_data_dir(dir);
        LocalClient::open(&config).unwrap()
    }

    fn recipient() -> JID {
        JID::new("6281234567890", "s.whatsapp.net")
    }

    #[tokio::test]
    async fn new_device_is_unpaired_and_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_in(dir.path());
        assert!(!client.has_identity().await);
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn pairing_channel_yields_code_after_connect() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_in(dir.path());

        let mut rx = client.pairing_channel().await.unwrap();
        client.connect().await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            PairingEvent::Code { code, timeout } => {
                assert_eq!(code.split(',').count(), 4);
                assert_eq!(timeout, Duration::from_secs(60));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    async fn next_event(rx: &mut PairingChannel) -> Option<PairingEvent> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn concurrent_pairing_channels_share_codes() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_in(dir.path());

        let mut first = client.pairing_channel().await.unwrap();
        let mut second = client.pairing_channel().await.unwrap();
        client.connect().await.unwrap();

        let Some(PairingEvent::Code { code: a, .. }) = next_event(&mut first).await else {
            panic!("first channel got no code");
        };
        let Some(PairingEvent::Code { code: b, .. }) = next_event(&mut second).await else {
            panic!("second channel got no code");
        };
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn register_ends_code_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_in(dir.path());

        let mut rx = client.pairing_channel().await.unwrap();
        client.connect().await.unwrap();
        assert!(matches!(next_event(&mut rx).await, Some(PairingEvent::Code { .. })));

        client.register(&recipient()).await.unwrap();
        assert_eq!(next_event(&mut rx).await, Some(PairingEvent::Success));
        assert_eq!(next_event(&mut rx).await, None);
    }

    #[tokio::test]
    async fn registration_from_another_client_is_adopted() {
        let dir = tempfile::tempdir().unwrap();
        let server = client_in(dir.path());
        server.connect().await.unwrap();
        assert!(!server.has_identity().await);

        let cli = client_in(dir.path());
        cli.register(&recipient()).await.unwrap();

        assert!(server.has_identity().await);
        let ack = server
            .send(&recipient(), &OutboundMessage::text("hi"), None)
            .await
            .unwrap();
        server.disconnect().await.unwrap();

        let reopened = client_in(dir.path());
        assert!(reopened.has_identity().await);
        assert_eq!(reopened.state().await.sent[0].id, ack.id);
    }

    #[tokio::test]
    async fn stale_disconnect_keeps_registration_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let server = client_in(dir.path());
        server.connect().await.unwrap();

        client_in(dir.path()).register(&recipient()).await.unwrap();
        server.disconnect().await.unwrap();

        let stored = SessionState::load(server.session_file()).unwrap().unwrap();
        assert_eq!(
            stored.registered_jid.as_deref(),
            Some("6281234567890@s.whatsapp.net")
        );
    }

    #[tokio::test]
    async fn media_is_pruned_with_its_log_entry() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_in(dir.path());
        client.register(&recipient()).await.unwrap();
        client.connect().await.unwrap();

        let upload = client.upload(b"png bytes".to_vec(), MediaType::Image).await.unwrap();
        let image = OutboundMessage::image("pic", &upload, b"png bytes");
        client.send(&recipient(), &image, Some(&upload.handle)).await.unwrap();
        let media = dir.path().join("media").join(&upload.handle);
        assert!(media.exists());

        {
            let mut inner = client.inner.lock().await;
            let mut filler = inner.state.sent[0].clone();
            filler.media_handle = None;
            for _ in 1..MAX_SENT_LOG {
                inner.state.sent.push(filler.clone());
            }
        }
        client
            .send(&recipient(), &OutboundMessage::text("one more"), None)
            .await
            .unwrap();

        assert!(!media.exists());
        assert_eq!(client.state().await.sent.len(), MAX_SENT_LOG);
    }

    #[tokio::test]
    async fn paired_device_refuses_pairing_channel() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_in(dir.path());
        client.register(&recipient()).await.unwrap();

        assert!(matches!(
            client.pairing_channel().await,
            Err(ClientError::AlreadyPaired)
        ));
    }

    #[tokio::test]
    async fn registration_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        client_in(dir.path()).register(&recipient()).await.unwrap();

        let reopened = client_in(dir.path());
        assert!(reopened.has_identity().await);
    }

    #[tokio::test]
    async fn send_requires_login_and_connection() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_in(dir.path());
        let msg = OutboundMessage::text("hi");

        assert!(matches!(
            client.send(&recipient(), &msg, None).await,
            Err(ClientError::NotLoggedIn)
        ));

        client.register(&recipient()).await.unwrap();
        assert!(matches!(
            client.send(&recipient(), &msg, None).await,
            Err(ClientError::NotConnected)
        ));

        client.connect().await.unwrap();
        let ack = client.send(&recipient(), &msg, None).await.unwrap();
        assert!(ack.id.starts_with("3EB0"));

        let state = client.state().await;
        assert_eq!(state.sent.len(), 1);
        assert_eq!(state.sent[0].to, "6281234567890@s.whatsapp.net");
        assert_eq!(state.sent[0].body, "hi");
    }

    #[tokio::test]
    async fn upload_seals_into_media_dir() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_in(dir.path());

        assert!(matches!(
            client.upload(vec![1, 2, 3], MediaType::Image).await,
            Err(ClientError::NotConnected)
        ));

        client.connect().await.unwrap();
        let upload = client.upload(b"png bytes".to_vec(), MediaType::Image).await.unwrap();
        assert_eq!(upload.file_length, 9);
        assert_eq!(upload.file_sha256, crypto::sha256(b"png bytes"));

        let stored = std::fs::read(dir.path().join("media").join(&upload.handle)).unwrap();
        assert_eq!(crypto::sha256(&stored), upload.file_enc_sha256);
    }

    #[tokio::test]
    async fn disconnect_persists_state() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_in(dir.path());
        client.connect().await.unwrap();
        client.disconnect().await.unwrap();

        assert!(!client.is_connected().await);
        assert!(client.session_file().exists());
    }
}
