// SPDX-License-Identifier: GPL-3.0-only

//! Licence validation collaborator
//!
//! Validation is asynchronous and completes once. The engine wraps every call
//! in the configured timeout; a timeout surfaces as a network error.

use crate::errors::{SdkError, SdkResult};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Optional feature sets unlocked by a licence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseFeatures {
    /// Skin, face reshaping and makeup filters
    pub beauty: bool,
    /// Cloud filter catalogue and downloads
    pub cloud_filters: bool,
}

impl LicenseFeatures {
    pub fn all() -> Self {
        Self {
            beauty: true,
            cloud_filters: true,
        }
    }
}

/// Outcome of a successful validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseInfo {
    pub features: LicenseFeatures,
    pub expires_at: Option<DateTime<Utc>>,
}

impl LicenseInfo {
    pub fn new(features: LicenseFeatures) -> Self {
        Self {
            features,
            expires_at: None,
        }
    }

    pub fn expiring(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Licence verification service
pub trait LicenseValidator: Send + Sync {
    fn validate<'a>(&'a self, key: &'a str) -> BoxFuture<'a, SdkResult<LicenseInfo>>;
}

/// Run a validation bounded by `timeout`
pub async fn validate_with_timeout(
    validator: &dyn LicenseValidator,
    key: &str,
    timeout: Duration,
) -> SdkResult<LicenseInfo> {
    debug!(timeout_secs = timeout.as_secs_f64(), "Validating licence");
    match tokio::time::timeout(timeout, validator.validate(key)).await {
        Ok(result) => {
            let info = result?;
            if info.is_expired_at(Utc::now()) {
                return Err(SdkError::LicenseExpired(format!(
                    "licence expired on {}",
                    info.expires_at.map(|t| t.to_rfc3339()).unwrap_or_default()
                )));
            }
            Ok(info)
        }
        Err(_) => Err(SdkError::Network(format!(
            "licence validation timed out after {:.1}s",
            timeout.as_secs_f64()
        ))),
    }
}

/// Validator backed by a fixed key table
#[derive(Debug, Clone, Default)]
pub struct OfflineLicenseValidator {
    keys: HashMap<String, LicenseInfo>,
    latency: Duration,
}

impl OfflineLicenseValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `key` with the given licence
    pub fn with_key(mut self, key: impl Into<String>, info: LicenseInfo) -> Self {
        self.keys.insert(key.into(), info);
        self
    }

    /// Delay every answer, mimicking a round trip
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Validator accepting only the development key `"demo"` with every feature
    pub fn demo() -> Self {
        Self::new().with_key("demo", LicenseInfo::new(LicenseFeatures::all()))
    }
}

impl LicenseValidator for OfflineLicenseValidator {
    fn validate<'a>(&'a self, key: &'a str) -> BoxFuture<'a, SdkResult<LicenseInfo>> {
        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if key.trim().is_empty() {
                return Err(SdkError::LicenseInvalid("empty licence key".into()));
            }
            let info = self
                .keys
                .get(key)
                .cloned()
                .ok_or_else(|| SdkError::LicenseInvalid("unknown licence key".into()))?;
            info!(
                beauty = info.features.beauty,
                cloud_filters = info.features.cloud_filters,
                "Licence accepted"
            );
            Ok(info)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_key_rejected() {
        let validator = OfflineLicenseValidator::demo();
        let err = validate_with_timeout(&validator, "nope", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::LicenseInvalid(_)));

        let info = validate_with_timeout(&validator, "demo", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(info.features.beauty);
    }

    #[tokio::test]
    async fn test_expired_key() {
        let expired = LicenseInfo::new(LicenseFeatures::default()).expiring(Utc::now() - chrono::Duration::days(1));
        let validator = OfflineLicenseValidator::new().with_key("old", expired);
        let err = validate_with_timeout(&validator, "old", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::LicenseExpired(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_network_error() {
        let validator = OfflineLicenseValidator::demo().with_latency(Duration::from_millis(200));
        let err = validate_with_timeout(&validator, "demo", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Network(_)));
    }
}
