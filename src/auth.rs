use crate::audit_log;
use crate::config::UserConfig;
use crate::database::Database;
use crate::errors::ApiError;
use crate::logging::ANONYMOUS;
use crate::metrics::{AUDIT_ENTRIES_WRITTEN, AUTH_ATTEMPTS_TOTAL};
use crate::models::{Identity, Role};
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::{SecondsFormat, Utc};
use hmac::digest::{Key, KeyInit};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

struct StoredUser {
    password_tag: Vec<u8>,
    role: Role,
}

/// Username → (password, role) mapping, read-only after construction.
///
/// Passwords are kept as HMAC tags under a per-process random key so that
/// checking a candidate goes through `Mac::verify_slice`, which compares in
/// constant time regardless of password length or shared prefixes.
pub struct CredentialStore {
    key: [u8; 64],
    users: HashMap<String, StoredUser>,
}

impl CredentialStore {
    pub fn new(users: &HashMap<String, UserConfig>) -> Self {
        let mut key = [0u8; 64];
        OsRng.fill_bytes(&mut key);

        let mut store = Self {
            key,
            users: HashMap::with_capacity(users.len()),
        };
        for (username, user) in users {
            let password_tag = store.tag(user.password.as_bytes());
            store.users.insert(
                username.clone(),
                StoredUser {
                    password_tag,
                    role: user.role,
                },
            );
        }
        store
    }

    fn mac(&self) -> HmacSha256 {
        // 64 bytes is exactly one SHA-256 block
        <HmacSha256 as KeyInit>::new(Key::<HmacSha256>::from_slice(&self.key))
    }

    fn tag(&self, password: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(password);
        mac.finalize().into_bytes().to_vec()
    }

    /// Returns the user's role when `username` exists and `password` matches.
    pub fn verify(&self, username: &str, password: &str) -> Option<Role> {
        let user = self.users.get(username)?;
        let mut mac = self.mac();
        mac.update(password.as_bytes());
        mac.verify_slice(&user.password_tag).ok().map(|_| user.role)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

/// Extract username and password from a `Basic` Authorization header
pub fn extract_basic_credentials(auth_header: Option<&str>) -> Result<BasicCredentials> {
    let header = auth_header.ok_or_else(|| anyhow!("Missing Authorization header"))?;
    let (scheme, encoded) = header
        .trim()
        .split_once(' ')
        .ok_or_else(|| anyhow!("Malformed Authorization header"))?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(anyhow!("Unsupported authorization scheme: {}", scheme));
    }

    let decoded = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| anyhow!("Invalid base64 in credentials: {}", e))?;
    let decoded = String::from_utf8(decoded).map_err(|_| anyhow!("Credentials are not UTF-8"))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| anyhow!("Credentials missing ':' separator"))?;

    Ok(BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Validates Basic credentials and records every successful authentication
/// in the audit log before the caller sees the identity.
#[derive(Clone)]
pub struct AuthGuard {
    credentials: Arc<CredentialStore>,
    db: Database,
}

impl AuthGuard {
    pub fn new(credentials: Arc<CredentialStore>, db: Database) -> Self {
        Self { credentials, db }
    }

    pub async fn authenticate(&self, auth_header: Option<&str>, path: &str) -> Result<Identity, ApiError> {
        let creds = match extract_basic_credentials(auth_header) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "Rejected Authorization header");
                AUTH_ATTEMPTS_TOTAL.with_label_values(&["failure"]).inc();
                audit_log!("authentication", path, ANONYMOUS, false);
                return Err(ApiError::Unauthorized);
            }
        };

        let role = match self.credentials.verify(&creds.username, &creds.password) {
            Some(role) => role,
            None => {
                AUTH_ATTEMPTS_TOTAL.with_label_values(&["failure"]).inc();
                audit_log!("authentication", path, creds.username, false);
                return Err(ApiError::Unauthorized);
            }
        };

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        self.db
            .insert_audit_entry(&creds.username, path, &timestamp)
            .await?;
        AUDIT_ENTRIES_WRITTEN.inc();
        AUTH_ATTEMPTS_TOTAL.with_label_values(&["success"]).inc();
        audit_log!("authentication", path, creds.username, true);

        Ok(Identity {
            username: creds.username,
            role,
        })
    }
}

impl Identity {
    /// Fails with `Forbidden(reason)` unless this identity's role is listed.
    pub fn require_role(&self, allowed: &[Role], reason: &str) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::forbidden(reason))
        }
    }
}
