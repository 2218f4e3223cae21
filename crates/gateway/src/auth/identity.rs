//! Resolving a provider account to one allowed email address.

use super::provider::{EmailRecord, IdentityProvider, ProviderCredential};
use super::AuthError;

/// Email domain allow-list with a single permitted domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPolicy {
    allowed_domain: String,
}

impl DomainPolicy {
    pub fn new(allowed_domain: impl Into<String>) -> Self {
        let allowed_domain: String = allowed_domain.into();
        Self {
            allowed_domain: allowed_domain
                .trim()
                .trim_start_matches('@')
                .to_ascii_lowercase(),
        }
    }

    pub fn allowed_domain(&self) -> &str {
        &self.allowed_domain
    }

    /// Accept `email` only when everything after its last `@` is exactly the
    /// allowed domain. `user@evilexample.com` and `user@sub.example.com` do not
    /// match `example.com`.
    pub fn check(&self, email: &str) -> Result<(), AuthError> {
        let (local, domain) = email.rsplit_once('@').unwrap_or(("", email));

        if local.is_empty() || !domain.eq_ignore_ascii_case(&self.allowed_domain) {
            return Err(AuthError::DomainNotAllowed {
                domain: domain.to_string(),
                allowed: self.allowed_domain.clone(),
            });
        }

        Ok(())
    }
}

/// The first address that is both primary and verified.
pub fn select_primary_verified(records: &[EmailRecord]) -> Option<&EmailRecord> {
    records
        .iter()
        .find(|record| record.is_primary && record.is_verified)
}

/// Fetch the account's addresses, pick the primary verified one and check it
/// against the domain policy.
pub async fn verify_identity(
    provider: &dyn IdentityProvider,
    credential: &ProviderCredential,
    policy: &DomainPolicy,
) -> Result<String, AuthError> {
    let records = provider.fetch_emails(credential).await?;

    let email = select_primary_verified(&records)
        .map(|record| record.address.clone())
        .ok_or(AuthError::IdentityUnresolved)?;

    policy.check(&email)?;
    Ok(email)
}
