use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::{debug, instrument};

use super::types::Claims;
use crate::config::ConfigError;
use crate::shared::AppError;

pub const TOKEN_ISSUER: &str = "trackle-app";

/// Issues and verifies HS256 identity tokens.
///
/// The secret is handed in at construction time; a service that exists has a
/// usable key, so `issue` only fails on encoding errors.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl_hours: i64) -> Result<Self, ConfigError> {
        if secret.trim().is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        if ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                name: "TOKEN_TTL_HOURS",
                value: ttl_hours.to_string(),
            });
        }

        // Only HS256 is accepted, whatever the token header claims
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_nbf = true;
        validation.leeway = 5;
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "nbf", "iat", "iss", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::hours(ttl_hours),
        })
    }

    /// Lifetime of an issued token, also used as the cookie max-age
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Creates a signed token for the given user
    #[instrument(skip(self))]
    pub fn issue(&self, user_id: i64) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp() as usize,
            nbf: now.timestamp() as usize,
            exp: (now + self.ttl).timestamp() as usize,
            iss: TOKEN_ISSUER.to_string(),
        };

        debug!(exp = claims.exp, "Issuing identity token");

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal("Failed to generate token", e))
    }

    /// Validates signature, algorithm, issuer and time window; returns the user id.
    /// Every failure is reported the same way.
    #[instrument(skip(self, token))]
    pub fn verify(&self, token: &str) -> Result<i64, AppError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!(error = %e, "Token rejected");
            invalid_token()
        })?;

        data.claims.sub.parse::<i64>().map_err(|e| {
            debug!(error = %e, "Token subject is not a user id");
            invalid_token()
        })
    }
}

fn invalid_token() -> AppError {
    AppError::Authentication("Invalid or expired token".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    fn service() -> TokenService {
        TokenService::new(SECRET, 24).unwrap()
    }

    fn sign(claims: &Claims, algorithm: Algorithm, secret: &str) -> String {
        encode(
            &Header::new(algorithm),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims_with_window(nbf_offset: i64, exp_offset: i64) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: "7".to_string(),
            iat: now as usize,
            nbf: (now + nbf_offset) as usize,
            exp: (now + exp_offset) as usize,
            iss: TOKEN_ISSUER.to_string(),
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let service = service();
        let token = service.issue(42).unwrap();

        assert_eq!(token.matches('.').count(), 2);
        assert_eq!(service.verify(&token).unwrap(), 42);
    }

    #[test]
    fn test_token_window_is_ttl() {
        let service = service();
        let token = service.issue(1).unwrap();

        let data = decode::<Claims>(&token, &service.decoding_key, &service.validation).unwrap();
        assert_eq!(data.claims.exp - data.claims.iat, 24 * 3600);
        assert_eq!(data.claims.nbf, data.claims.iat);
        assert_eq!(service.ttl_seconds(), 24 * 3600);
    }

    #[test]
    fn test_garbage_token() {
        let result = service().verify("invalid.token.here");
        assert!(matches!(result, Err(AppError::Authentication(msg)) if msg == "Invalid or expired token"));
    }

    #[test]
    fn test_token_with_different_secret() {
        let other = TokenService::new("another-secret", 24).unwrap();
        let token = other.issue(1).unwrap();

        assert!(matches!(
            service().verify(&token),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn test_expired_token() {
        let token = sign(&claims_with_window(-7200, -3600), Algorithm::HS256, SECRET);
        assert!(matches!(
            service().verify(&token),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn test_not_yet_valid_token() {
        let token = sign(&claims_with_window(3600, 7200), Algorithm::HS256, SECRET);
        assert!(matches!(
            service().verify(&token),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn test_unexpected_algorithm_rejected() {
        // Same secret, different HMAC: still refused
        let token = sign(&claims_with_window(0, 3600), Algorithm::HS512, SECRET);
        assert!(matches!(
            service().verify(&token),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let mut claims = claims_with_window(0, 3600);
        claims.iss = "someone-else".to_string();
        let token = sign(&claims, Algorithm::HS256, SECRET);

        assert!(service().verify(&token).is_err());
    }

    #[test]
    fn test_non_numeric_subject_rejected() {
        let mut claims = claims_with_window(0, 3600);
        claims.sub = "alice".to_string();
        let token = sign(&claims, Algorithm::HS256, SECRET);

        assert!(matches!(
            service().verify(&token),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn test_empty_secret_is_a_config_error() {
        assert!(matches!(
            TokenService::new("", 24),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));
        assert!(TokenService::new(SECRET, 0).is_err());
    }
}
