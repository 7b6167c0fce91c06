//! Group-claim based tenant resolution.

use crate::models::organization::{Organization, ORG_GROUP_PREFIX};
use crate::utils::jwt::{decode_claims, DecodedToken};
use explain_core::error::AppError;

pub const DEFAULT_BUCKET_SUFFIX: &str = "-bucket";

/// Organizations granted by the token's `org-*` groups, sorted by id.
///
/// A malformed token yields an empty list; "no organizations" is a state the
/// caller handles, not a failure.
pub fn resolve_organizations(token: &str) -> Vec<Organization> {
    let claims = match decode_claims(token) {
        DecodedToken::Valid(claims) => claims,
        DecodedToken::Malformed(reason) => {
            tracing::warn!(reason = %reason, "Failed to decode token; no organizations resolved");
            return Vec::new();
        }
    };

    let mut organizations: Vec<Organization> = claims
        .groups
        .iter()
        .filter_map(|group| group.strip_prefix(ORG_GROUP_PREFIX))
        .map(Organization::from_id)
        .collect();

    organizations.sort_by(|a, b| a.id.cmp(&b.id));
    organizations.dedup_by(|a, b| a.id == b.id);
    organizations
}

/// Bucket for `organization_id` using the default `-bucket` suffix.
pub fn resolve_bucket(token: &str, organization_id: Option<&str>) -> Option<String> {
    resolve_bucket_with_suffix(token, organization_id, DEFAULT_BUCKET_SUFFIX)
}

/// With an organization, the bucket is `{id}{suffix}` when the token holds
/// exactly `org-{id}`. Without one, the first group in claim order names the
/// bucket as-is.
pub fn resolve_bucket_with_suffix(
    token: &str,
    organization_id: Option<&str>,
    suffix: &str,
) -> Option<String> {
    let claims = decode_claims(token).into_claims()?;

    match organization_id {
        Some(id) => {
            let wanted = format!("{}{}", ORG_GROUP_PREFIX, id);
            claims
                .groups
                .iter()
                .find(|group| **group == wanted)
                .map(|_| format!("{}{}", id, suffix))
        }
        None => claims.groups.first().cloned(),
    }
}

/// Applies the configured fallback bucket on top of claim resolution.
#[derive(Debug, Clone)]
pub struct BucketResolver {
    fallback_bucket: Option<String>,
    suffix: String,
}

impl BucketResolver {
    pub fn new(fallback_bucket: Option<String>, suffix: impl Into<String>) -> Self {
        Self {
            fallback_bucket: fallback_bucket.filter(|b| !b.is_empty()),
            suffix: suffix.into(),
        }
    }

    pub fn resolve(&self, token: &str, organization_id: Option<&str>) -> Result<String, AppError> {
        if let Some(bucket) = resolve_bucket_with_suffix(token, organization_id, &self.suffix) {
            return Ok(bucket);
        }

        match &self.fallback_bucket {
            Some(fallback) => {
                tracing::warn!(
                    organization_id = organization_id.unwrap_or("<none>"),
                    bucket = %fallback,
                    "No bucket derivable from user groups, using fallback bucket"
                );
                Ok(fallback.clone())
            }
            None => Err(AppError::NoBucket),
        }
    }
}

impl Default for BucketResolver {
    fn default() -> Self {
        Self::new(None, DEFAULT_BUCKET_SUFFIX)
    }
}
