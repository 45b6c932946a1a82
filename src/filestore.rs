//! Object-store access: presigned upload URLs against an S3-compatible
//! endpoint. Clients upload directly; the backend only mints the URL and
//! later binds the resulting key to a product row.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;

use crate::config::S3Config;
use crate::error::ServiceError;

const PRESIGN_TTL: Duration = Duration::from_secs(15 * 60);

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Returns a time-limited URL granting a single `PUT` of `key`.
    async fn presign_put(&self, key: &str, content_type: &str) -> Result<String, ServiceError>;
}

pub struct S3FileStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3FileStore {
    pub async fn connect(cfg: &S3Config) -> anyhow::Result<Self> {
        let credentials = Credentials::new(&cfg.access_key, &cfg.secret_key, None, None, "static");
        let conf = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(format!("http://{}", cfg.endpoint))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let store = Self {
            client: aws_sdk_s3::Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
        };
        store.ensure_bucket().await?;

        tracing::info!(bucket = %store.bucket, "connected to object store");
        Ok(store)
    }

    /// Creates the bucket on first start and opens its objects for public
    /// reads so image URLs work without signing.
    async fn ensure_bucket(&self) -> anyhow::Result<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                tracing::info!(bucket = %self.bucket, "bucket already exists");
                return Ok(());
            }
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map_or(false, |service_err| service_err.is_not_found());
                if !not_found {
                    return Err(anyhow::Error::new(err).context("failed to check bucket existence"));
                }
            }
        }

        tracing::info!(bucket = %self.bucket, "bucket not found, creating");
        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .context("failed to create bucket")?;

        let policy = format!(
            r#"{{
                "Version": "2012-10-17",
                "Statement": [
                    {{
                        "Effect": "Allow",
                        "Principal": "*",
                        "Action": ["s3:GetObject"],
                        "Resource": ["arn:aws:s3:::{}/*"]
                    }}
                ]
            }}"#,
            self.bucket
        );
        self.client
            .put_bucket_policy()
            .bucket(&self.bucket)
            .policy(policy)
            .send()
            .await
            .context("failed to set bucket policy")?;

        tracing::info!(bucket = %self.bucket, "bucket created and policy set");
        Ok(())
    }
}

#[async_trait]
impl FileStore for S3FileStore {
    async fn presign_put(&self, key: &str, content_type: &str) -> Result<String, ServiceError> {
        let presigning = PresigningConfig::expires_in(PRESIGN_TTL)
            .map_err(|err| ServiceError::internal(format!("invalid presign expiry: {err}")))?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|err| {
                ServiceError::Unavailable(format!("failed to generate presigned upload URL: {err}"))
            })?;

        Ok(request.uri().to_string())
    }
}
