use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;

use super::{BackendError, FileStorage, PresignedUpload};
use crate::server_state::Config;

const PRESIGNED_UPLOAD_LIFETIME: Duration = Duration::from_secs(15 * 60);

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    config: Arc<Config>,
}

impl S3Storage {
    /// Builds a client from the standard AWS environment (credentials, endpoint overrides),
    /// pinned to the configured region.
    pub async fn new(config: Arc<Config>) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.s3_region.clone()))
            .load()
            .await;

        Self {
            client: Client::new(&aws_config),
            config,
        }
    }
}

#[async_trait]
impl FileStorage for S3Storage {
    async fn move_from_temp(&self, temp_key: &str, final_key: &str) -> Result<String, BackendError> {
        let bucket = &self.config.s3_bucket;
        let copy_source = format!("{bucket}/{}", urlencoding::encode(temp_key));

        self.client
            .copy_object()
            .bucket(bucket)
            .copy_source(copy_source)
            .key(final_key)
            .send()
            .await
            .map_err(|err| {
                BackendError::Storage(format!("copying {temp_key} to {final_key} failed: {err:?}"))
            })?;

        if let Err(err) = self
            .client
            .delete_object()
            .bucket(bucket)
            .key(temp_key)
            .send()
            .await
        {
            // A move that leaves the source behind isn't a move. Undo the copy and fail.
            if let Err(rollback_err) = self
                .client
                .delete_object()
                .bucket(bucket)
                .key(final_key)
                .send()
                .await
            {
                tracing::warn!(error = ?rollback_err, final_key, "[S3 MOVE] Failed undoing copy, object orphaned");
            }

            return Err(BackendError::Storage(format!(
                "deleting temp object {temp_key} failed: {err:?}"
            )));
        }

        Ok(self.config.public_url(final_key))
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<(), BackendError> {
        if keys.is_empty() {
            return Ok(());
        }

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| BackendError::Storage(format!("{err:?}")))?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(|err| BackendError::Storage(format!("{err:?}")))?;

        self.client
            .delete_objects()
            .bucket(&self.config.s3_bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|err| BackendError::Storage(format!("deleting {} keys failed: {err:?}", keys.len())))?;

        Ok(())
    }

    async fn presign_temp_uploads(
        &self,
        temp_keys: &[String],
    ) -> Result<Vec<PresignedUpload>, BackendError> {
        let presigning_config = PresigningConfig::expires_in(PRESIGNED_UPLOAD_LIFETIME)
            .map_err(|err| BackendError::Presign(err.to_string()))?;

        let mut presigned_uploads = Vec::with_capacity(temp_keys.len());

        for key in temp_keys {
            let presigned_request = self
                .client
                .put_object()
                .bucket(&self.config.s3_bucket)
                .key(key)
                .presigned(presigning_config.clone())
                .await
                .map_err(|err| BackendError::Presign(format!("{err:?}")))?;

            presigned_uploads.push(PresignedUpload {
                key: key.clone(),
                url: presigned_request.uri().to_string(),
            });
        }

        Ok(presigned_uploads)
    }
}
