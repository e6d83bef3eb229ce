//! Admin access for the reporting surface.
//!
//! There is one shared secret. Callers prove they know it either directly
//! (the `password` form field or query parameter) or with the session token
//! derived from it, `hex(HMAC-SHA256(secret, "readly-admin"))`, which is set
//! as the `admin_token` cookie on login. Both checks run in constant time.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use hmac::{Hmac, Mac};
use readly_common::{Error, Result};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const ADMIN_COOKIE_NAME: &str = "admin_token";

const TOKEN_MESSAGE: &[u8] = b"readly-admin";
const SESSION_DAYS: i64 = 7;

/// Verifies admin credentials against the configured secret.
#[derive(Clone)]
pub struct AdminGuard {
    secret: Option<String>,
}

impl AdminGuard {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    fn secret(&self) -> Result<&str> {
        self.secret
            .as_deref()
            .ok_or_else(|| Error::not_configured("Admin password not configured"))
    }

    fn mac(secret: &str) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| Error::internal(format!("Invalid HMAC key: {}", e)))
    }

    /// The session token for the configured secret.
    pub fn derive_token(&self) -> Result<String> {
        let mut mac = Self::mac(self.secret()?)?;
        mac.update(TOKEN_MESSAGE);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Check a plain password.
    pub fn verify_password(&self, candidate: &str) -> Result<()> {
        let secret = self.secret()?;

        // Both sides are MACed with the secret so the final comparison is
        // over equal-length digests.
        let mut expected = Self::mac(secret)?;
        expected.update(secret.as_bytes());
        let expected = expected.finalize().into_bytes();

        let mut mac = Self::mac(secret)?;
        mac.update(candidate.as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| Error::unauthorized("Invalid password"))
    }

    /// Check a session token.
    pub fn verify_token(&self, token: &str) -> Result<()> {
        let mut mac = Self::mac(self.secret()?)?;
        let provided = hex::decode(token).map_err(|_| Error::unauthorized("Invalid token"))?;
        mac.update(TOKEN_MESSAGE);
        mac.verify_slice(&provided)
            .map_err(|_| Error::unauthorized("Invalid token"))
    }

    /// Accept either credential form.
    ///
    /// A missing secret is reported as `NotConfigured` before any credential
    /// is looked at.
    pub fn authorize(&self, password: Option<&str>, token: Option<&str>) -> Result<()> {
        self.secret()?;

        if let Some(token) = token.filter(|t| !t.is_empty()) {
            if self.verify_token(token).is_ok() {
                return Ok(());
            }
        }

        if let Some(password) = password.filter(|p| !p.is_empty()) {
            if self.verify_password(password).is_ok() {
                return Ok(());
            }
        }

        Err(Error::unauthorized("Invalid password"))
    }

    /// Check the session cookie in `jar`, if any.
    pub fn authorize_cookie(&self, jar: &CookieJar) -> Result<()> {
        let token = jar.get(ADMIN_COOKIE_NAME).map(|c| c.value().to_string());
        self.authorize(None, token.as_deref())
    }

    /// Cookie carrying the session token.
    pub fn session_cookie(&self) -> Result<Cookie<'static>> {
        Ok(Cookie::build((ADMIN_COOKIE_NAME, self.derive_token()?))
            .http_only(true)
            .secure(true)
            .same_site(SameSite::Strict)
            .max_age(time::Duration::days(SESSION_DAYS))
            .path("/")
            .build())
    }
}

/// Generate a random secret suitable for `admin.password`.
pub fn generate_secret() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

/// Cookie that clears the session on logout, whether or not the browser
/// still holds one.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((ADMIN_COOKIE_NAME, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_unconfigured_is_distinct() {
        let guard = AdminGuard::new(None);
        assert_matches!(guard.authorize(Some("x"), None), Err(Error::NotConfigured(_)));
        assert_matches!(guard.derive_token(), Err(Error::NotConfigured(_)));

        let guard = AdminGuard::new(Some(String::new()));
        assert_matches!(guard.verify_password("x"), Err(Error::NotConfigured(_)));
    }

    #[test]
    fn test_password() {
        let guard = AdminGuard::new(Some("s3cret".into()));
        assert!(guard.verify_password("s3cret").is_ok());
        assert_matches!(guard.verify_password("s3cre"), Err(Error::Unauthorized(_)));
        assert_matches!(guard.verify_password(""), Err(Error::Unauthorized(_)));
    }

    #[test]
    fn test_token_matches_reference_hmac() {
        let guard = AdminGuard::new(Some("key".into()));
        let token = guard.derive_token().unwrap();

        let mut mac = HmacSha256::new_from_slice(b"key").unwrap();
        mac.update(b"readly-admin");
        assert_eq!(token, hex::encode(mac.finalize().into_bytes()));
        assert_eq!(token.len(), 64);

        assert!(guard.verify_token(&token).is_ok());
        assert_matches!(guard.verify_token("zz"), Err(Error::Unauthorized(_)));
        assert_matches!(guard.verify_token(&token[..62]), Err(Error::Unauthorized(_)));
    }

    #[test]
    fn test_token_depends_on_secret() {
        let a = AdminGuard::new(Some("a".into())).derive_token().unwrap();
        let b = AdminGuard::new(Some("b".into()));
        assert_matches!(b.verify_token(&a), Err(Error::Unauthorized(_)));
    }

    #[test]
    fn test_authorize_either_form() {
        let guard = AdminGuard::new(Some("pw".into()));
        let token = guard.derive_token().unwrap();

        assert!(guard.authorize(Some("pw"), None).is_ok());
        assert!(guard.authorize(None, Some(&token)).is_ok());
        assert!(guard.authorize(Some("pw"), Some("stale")).is_ok());
        assert_matches!(guard.authorize(None, None), Err(Error::Unauthorized(_)));
        assert_matches!(
            guard.authorize(Some("nope"), Some("stale")),
            Err(Error::Unauthorized(_))
        );
    }

    #[test]
    fn test_generate_secret() {
        let a = generate_secret();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, generate_secret());
    }

    #[test]
    fn test_session_cookie_attributes() {
        let guard = AdminGuard::new(Some("pw".into()));
        let cookie = guard.session_cookie().unwrap();

        assert_eq!(cookie.name(), ADMIN_COOKIE_NAME);
        assert_eq!(cookie.value(), guard.derive_token().unwrap());
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.max_age(), Some(time::Duration::days(7)));
    }

    #[test]
    fn test_removal_cookie_expires_immediately() {
        let cookie = removal_cookie();
        assert_eq!(cookie.name(), ADMIN_COOKIE_NAME);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }
}
