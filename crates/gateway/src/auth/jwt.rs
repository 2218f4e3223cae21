//! JWT token creation and validation.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, Secret};

use super::types::Claims;
use super::AuthError;

/// Lifetime of every issued token, in seconds.
pub const TOKEN_LIFETIME_SECS: i64 = 3600;

/// Issues and verifies HS256 identity tokens with the server-held secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &Secret<String>) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Create a new token for a verified email.
    pub fn issue(&self, email: &str) -> Result<String, AuthError> {
        self.issue_at(email, Utc::now())
    }

    /// Create a token as if issued at `now`.
    pub fn issue_at(&self, email: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = Claims {
            email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(TOKEN_LIFETIME_SECS)).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(AuthError::TokenIssue)
    }

    /// Validate a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_at(token, Utc::now())
    }

    /// Validate a token against the clock reading `now`.
    ///
    /// Signature, algorithm, payload shape and expiry failures all collapse
    /// into `InvalidToken`; the cause is only logged.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Expiry is checked below against the supplied clock.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| {
                tracing::debug!("Token rejected: {}", e);
                AuthError::InvalidToken
            })?
            .claims;

        if claims.exp <= now.timestamp() {
            tracing::debug!("Token rejected: expired for {}", claims.email);
            return Err(AuthError::InvalidToken);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_service() -> TokenService {
        TokenService::new(&Secret::new("test-secret-key-for-testing-only".to_string()))
    }

    fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_create_and_validate_token() {
        let service = test_service();
        let token = service.issue("a@x.com").expect("should create token");

        let claims = service.verify(&token).expect("should validate token");
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_invalid_token_rejected() {
        let service = test_service();
        let result = service.verify("invalid-token");
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = test_service()
            .issue("a@x.com")
            .expect("should create token");

        let wrong = TokenService::new(&Secret::new("wrong-secret".to_string()));
        assert!(matches!(wrong.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_expiry_boundary() {
        let service = test_service();
        let now = issued_at();
        let token = service.issue_at("a@x.com", now).unwrap();

        assert!(service.verify_at(&token, now).is_ok());
        assert!(service
            .verify_at(&token, now + Duration::minutes(59))
            .is_ok());
        let expiry = now + Duration::seconds(TOKEN_LIFETIME_SECS);
        assert!(service.verify_at(&token, expiry).is_err());
        assert!(service
            .verify_at(&token, expiry + Duration::seconds(1))
            .is_err());
    }

    #[test]
    fn test_issuance_is_deterministic_with_fixed_clock() {
        let service = test_service();
        let a = service.issue_at("a@x.com", issued_at()).unwrap();
        let b = service.issue_at("a@x.com", issued_at()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let service = test_service();
        let token = service.issue("a@x.com").unwrap();
        let other = service.issue("b@x.com").unwrap();

        // Splice b's payload onto a's signature.
        let a: Vec<&str> = token.split('.').collect();
        let b: Vec<&str> = other.split('.').collect();
        let forged = format!("{}.{}.{}", a[0], b[1], a[2]);
        assert!(service.verify(&forged).is_err());
    }

    #[test]
    fn test_debug_hides_keys() {
        assert_eq!(format!("{:?}", test_service()), "TokenService { .. }");
    }
}
