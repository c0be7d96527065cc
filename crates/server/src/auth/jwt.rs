use anyhow::{anyhow, bail, Context};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use redline_common::types::Actor;

pub const SESSION_TOKEN_TTL_SECONDS: i64 = 60 * 60;

/// Session claims: the subject user plus their verified email addresses.
/// Emails ride in the token so invite binding needs no directory lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionTokenClaims {
    sub: String,
    #[serde(default)]
    emails: Vec<String>,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct SessionTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionTokenService {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        if secret.len() < 32 {
            bail!("session secret must be at least 32 characters long");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn issue_session_token(
        &self,
        user_id: Uuid,
        emails: &[String],
    ) -> anyhow::Result<String> {
        self.issue_session_token_at(user_id, emails, current_unix_timestamp()?)
    }

    fn issue_session_token_at(
        &self,
        user_id: Uuid,
        emails: &[String],
        issued_at: i64,
    ) -> anyhow::Result<String> {
        let claims = SessionTokenClaims {
            sub: user_id.to_string(),
            emails: emails.to_vec(),
            iat: issued_at,
            exp: issued_at + SESSION_TOKEN_TTL_SECONDS,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to encode session token")
    }

    pub fn validate_session_token(&self, token: &str) -> anyhow::Result<Actor> {
        let claims = decode::<SessionTokenClaims>(token, &self.decoding_key, &self.validation)
            .context("failed to decode session token")?
            .claims;

        let user_id = Uuid::parse_str(&claims.sub)
            .with_context(|| format!("session token subject '{}' is not a UUID", claims.sub))?;

        Ok(Actor { user_id, emails: claims.emails })
    }
}

fn current_unix_timestamp() -> anyhow::Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|error| anyhow!("system clock is before unix epoch: {error}"))?;

    i64::try_from(duration.as_secs()).context("unix timestamp overflow")
}
