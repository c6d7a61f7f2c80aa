//! In-memory client used by service and API tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    MediaType, MessagingClient, OutboundMessage, PairingChannel, PairingEvent, SendResponse,
    UploadResponse,
};
use crate::client::ClientError;
use crate::types::JID;

/// What the mock emits on its pairing channel when connected unpaired.
#[derive(Debug, Clone)]
pub enum PairingScript {
    Emit(PairingEvent),
    /// Keep the channel open without sending anything.
    Silent,
}

pub struct MockClient {
    pub paired: AtomicBool,
    pub connected: AtomicBool,
    pub fail_connect: AtomicBool,
    pub fail_upload: AtomicBool,
    pub fail_send: AtomicBool,
    pub fail_pairing_channel: AtomicBool,
    pub connect_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub sent: Mutex<Vec<(JID, OutboundMessage, Option<String>)>>,
    pub uploaded: Mutex<Vec<Vec<u8>>>,
    pub pairing: Mutex<PairingScript>,
    pairing_tx: Mutex<Option<mpsc::Sender<PairingEvent>>>,
}

impl MockClient {
    /// A paired, connected session.
    pub fn connected() -> Self {
        let client = Self::unpaired();
        client.paired.store(true, Ordering::SeqCst);
        client.connected.store(true, Ordering::SeqCst);
        client
    }

    /// A fresh session that hands out a single pairing code.
    pub fn unpaired() -> Self {
        Self {
            paired: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            fail_upload: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            fail_pairing_channel: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            uploaded: Mutex::new(Vec::new()),
            pairing: Mutex::new(PairingScript::Emit(PairingEvent::Code {
                code: "2@MOCKREF,noise,identity,adv".into(),
                timeout: Duration::from_secs(60),
            })),
            pairing_tx: Mutex::new(None),
        }
    }

    pub fn set(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn upload_count(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn ack() -> SendResponse {
        SendResponse {
            id: "3EB0MOCKACK".into(),
            timestamp: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            server_id: None,
        }
    }
}

#[async_trait]
impl MessagingClient for MockClient {
    async fn connect(&self) -> Result<(), ClientError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ClientError::ConnectionFailed("network unreachable".into()));
        }
        self.connected.store(true, Ordering::SeqCst);

        let tx = self.pairing_tx.lock().unwrap().take();
        if let Some(tx) = tx {
            match self.pairing.lock().unwrap().clone() {
                PairingScript::Emit(event) => {
                    let _ = tx.try_send(event);
                }
                PairingScript::Silent => {
                    // Keep the sender alive so the receiver never sees a close.
                    *self.pairing_tx.lock().unwrap() = Some(tx);
                }
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn has_identity(&self) -> bool {
        self.paired.load(Ordering::SeqCst)
    }

    async fn pairing_channel(&self) -> Result<PairingChannel, ClientError> {
        if self.fail_pairing_channel.load(Ordering::SeqCst) {
            return Err(ClientError::ConnectionFailed("pairing socket closed".into()));
        }
        let (tx, rx) = mpsc::channel(4);
        *self.pairing_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn upload(
        &self,
        data: Vec<u8>,
        _media_type: MediaType,
    ) -> Result<UploadResponse, ClientError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(ClientError::UploadFailed("media server rejected upload".into()));
        }
        let len = data.len() as u64;
        self.uploaded.lock().unwrap().push(data);
        Ok(UploadResponse {
            url: "https://mmg.whatsapp.net/mock".into(),
            direct_path: "/mock".into(),
            handle: "mock-handle".into(),
            media_key: vec![7; 32],
            file_enc_sha256: vec![8; 32],
            file_sha256: vec![9; 32],
            file_length: len,
        })
    }

    async fn send(
        &self,
        to: &JID,
        message: &OutboundMessage,
        media_handle: Option<&str>,
    ) -> Result<SendResponse, ClientError> {
        if self.fail_send.load(Ordering::SeqCst) {
            self.connected.store(false, Ordering::SeqCst);
            return Err(ClientError::SendFailed("websocket closed".into()));
        }
        self.sent.lock().unwrap().push((
            to.clone(),
            message.clone(),
            media_handle.map(str::to_string),
        ));
        Ok(Self::ack())
    }
}
