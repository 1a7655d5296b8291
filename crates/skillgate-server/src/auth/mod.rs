//! Stateless time-window credentials
//!
//! A credential is the shared secret prefix followed by the label of the
//! current time window, e.g. `s3cr3t-prefix-xyz2026101714` at hour
//! granularity. Validation recomputes the expected credential for the current
//! window and the one before it, so a credential minted just before a window
//! boundary keeps working for one more window.
//!
//! Nothing is stored server side. There is no logout and no per-caller
//! revocation: a leaked credential stays valid until its window passes, and
//! the only remediation is rotating the shared secret.

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::clock::SharedClock;
use crate::config::AuthConfig;
use crate::error::GatewayError;

/// Resolution at which the window label changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WindowGranularity {
    Minute,
    #[default]
    Hour,
    Day,
}

impl WindowGranularity {
    /// Fixed textual label of the window containing `at`
    pub fn label(&self, at: DateTime<Utc>) -> String {
        match self {
            Self::Minute => at.format("%Y%m%d%H%M").to_string(),
            Self::Hour => at.format("%Y%m%d%H").to_string(),
            Self::Day => at.format("%Y%m%d").to_string(),
        }
    }

    pub fn step(&self) -> Duration {
        match self {
            Self::Minute => Duration::minutes(1),
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::days(1),
        }
    }
}

impl FromStr for WindowGranularity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            other => Err(anyhow::anyhow!("Invalid token window granularity: {}", other)),
        }
    }
}

/// Identity of an authenticated caller
///
/// All callers holding the shared secret belong to one trusted class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub name: String,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub actor: Actor,
    /// Label of the window the credential matched
    pub window: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing bearer credential")]
    MissingCredential,
    #[error("Credential is invalid or expired")]
    InvalidCredential,
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        GatewayError::unauthorized(err.to_string())
    }
}

pub struct TokenAuthenticator {
    secret_prefix: String,
    granularity: WindowGranularity,
    actor: Actor,
    clock: SharedClock,
}

impl TokenAuthenticator {
    pub fn new(config: &AuthConfig, clock: SharedClock) -> Self {
        Self {
            secret_prefix: config.shared_secret.clone(),
            granularity: config.granularity,
            actor: Actor {
                name: config.trusted_caller.clone(),
            },
            clock,
        }
    }

    /// Credential valid for the window containing `at`
    pub fn credential_for(&self, at: DateTime<Utc>) -> String {
        format!("{}{}", self.secret_prefix, self.granularity.label(at))
    }

    pub fn authenticate(&self, presented: Option<&str>) -> Result<Authenticated, AuthError> {
        self.authenticate_at(presented, self.clock.now())
    }

    /// Check `presented` against the current and the immediately preceding window
    pub fn authenticate_at(
        &self,
        presented: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Authenticated, AuthError> {
        let presented = presented
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(AuthError::MissingCredential)?;

        if self.secret_prefix.is_empty() {
            return Err(AuthError::InvalidCredential);
        }

        let presented_digest = Sha256::digest(presented.as_bytes());

        for at in [now, now - self.granularity.step()] {
            let expected = self.credential_for(at);
            let expected_digest = Sha256::digest(expected.as_bytes());
            if bool::from(presented_digest.as_slice().ct_eq(expected_digest.as_slice())) {
                return Ok(Authenticated {
                    actor: self.actor.clone(),
                    window: self.granularity.label(at),
                });
            }
        }

        Err(AuthError::InvalidCredential)
    }
}

/// Extract the credential from `Authorization: Bearer <credential>`
pub fn bearer_credential(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, credential) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(credential.trim().to_string())
}
