use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_s3::config::Credentials;
use errors::StoreError;

pub mod errors;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod models;
pub mod s3;

/// Where and as whom to talk to the object store.
///
/// Every field is optional; unset fields fall back to the AWS default
/// provider chain (profile files, instance metadata and so on).
#[derive(Debug, Clone, Default)]
pub struct StoreSettings {
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services. Enables path-style addressing.
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

impl StoreSettings {
    pub fn from_env() -> Self {
        StoreSettings {
            region: env_var("AWS_REGION"),
            endpoint_url: env_var("AWS_ENDPOINT_URL"),
            access_key_id: env_var("AWS_ACCESS_KEY_ID"),
            secret_access_key: env_var("AWS_SECRET_ACCESS_KEY"),
            session_token: env_var("AWS_SESSION_TOKEN"),
        }
    }
}

/// Builds an S3 client and resolves credentials once, so a missing or broken
/// credential setup shows up before any file is fetched.
pub async fn connect(settings: &StoreSettings) -> Result<aws_sdk_s3::Client, StoreError> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &settings.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(endpoint) = &settings.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    if let (Some(key_id), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
        loader = loader.credentials_provider(Credentials::new(
            key_id,
            secret,
            settings.session_token.clone(),
            None,
            "ferry-env",
        ));
    }

    let sdk_config = loader.load().await;

    let provider = match sdk_config.credentials_provider() {
        Some(provider) => provider,
        None => {
            return Err(StoreError::Auth {
                reason: "no credentials provider configured".to_string(),
            })
        }
    };
    if let Err(e) = provider.provide_credentials().await {
        return Err(StoreError::Auth {
            reason: e.to_string(),
        });
    }

    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(settings.endpoint_url.is_some())
        .build();

    log::debug!(
        "S3 client ready (region: {}, endpoint: {})",
        sdk_config
            .region()
            .map_or_else(|| "default".to_string(), ToString::to_string),
        settings.endpoint_url.as_deref().unwrap_or("default")
    );

    Ok(aws_sdk_s3::Client::from_conf(s3_config))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
