//! Upload service stand-in: waits, then marks the files uploaded in the
//! store, which pushes the conversation as `New`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatline_shared::store::AttachmentUploader;
use chatline_shared::{AttachmentUploadRequest, ConversationId, Result, TemporaryId};
use chatline_store::SqliteConversationStore;
use tracing::{info, warn};

pub struct SimulatedUploader {
    store: Arc<SqliteConversationStore>,
    delay: Duration,
}

impl SimulatedUploader {
    pub fn new(store: Arc<SqliteConversationStore>, delay: Duration) -> Self {
        Self { store, delay }
    }
}

#[async_trait]
impl AttachmentUploader for SimulatedUploader {
    async fn upload(
        &self,
        conversation_id: &ConversationId,
        _temporary_id: Option<&TemporaryId>,
        requests: Vec<AttachmentUploadRequest>,
    ) -> Result<()> {
        info!(conversation = %conversation_id, files = requests.len(), "uploading attachments");

        let store = self.store.clone();
        let delay = self.delay;
        let id = conversation_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = store.complete_attachment_upload(&id) {
                warn!(conversation = %id, error = %e, "upload completion failed");
            }
        });
        Ok(())
    }
}
