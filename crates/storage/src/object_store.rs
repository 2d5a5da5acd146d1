use crate::error::{Result, StorageError};
use config::S3Config;
use object_store::aws::AmazonS3Builder;
use object_store::ClientOptions;
use object_store::ObjectStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Create an S3-compatible object store from configuration
///
/// The bucket root is returned; the configured prefix is applied by the
/// `BackendReader` so that tenant directories resolve below it.
pub fn create_object_store(config: &S3Config) -> Result<Arc<dyn ObjectStore>> {
    let client_options = ClientOptions::new()
        .with_pool_max_idle_per_host(config.pool_max_idle_per_host)
        .with_pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs));

    let mut builder = if config.use_env_credentials {
        info!(bucket = %config.bucket, "Using AWS environment credential chain");
        let builder = AmazonS3Builder::from_env();

        // AWS uses the regional endpoint unless one is configured
        if config.endpoint.is_empty() {
            builder
        } else {
            builder.with_endpoint(&config.endpoint)
        }
    } else {
        info!(
            bucket = %config.bucket,
            endpoint = %config.endpoint,
            "Using explicit S3 credentials"
        );
        AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
    };

    builder = builder
        .with_bucket_name(&config.bucket)
        .with_region(&config.region)
        .with_client_options(client_options);

    if config.allow_http {
        builder = builder.with_allow_http(true);
    }

    if let Some(token) = &config.session_token {
        builder = builder.with_token(token);
    }

    let store = builder
        .build()
        .map_err(|e| StorageError::Config(format!("Failed to build S3 object store: {}", e)))?;

    Ok(Arc::new(store))
}
