//! Request extractors for the caller identity and idempotency key.
//!
//! Authentication happens upstream; the identity provider forwards the
//! verified caller as `X-Account-Id` and `X-Account-Role` headers.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::domain::{AccountId, Actor, Role};
use crate::error::LedgerError;

/// Header carrying the caller's account ID.
pub const ACCOUNT_ID_HEADER: &str = "x-account-id";
/// Header carrying the caller's role.
pub const ACCOUNT_ROLE_HEADER: &str = "x-account-role";
/// Header carrying the client's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Longest idempotency key accepted.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Actor);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = LedgerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers).map(Self)
    }
}

/// Optional client-supplied idempotency key.
#[derive(Debug, Clone, Default)]
pub struct IdempotencyKey(pub Option<String>);

impl<S> FromRequestParts<S> for IdempotencyKey
where
    S: Send + Sync,
{
    type Rejection = LedgerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        idempotency_key_from_headers(&parts.headers).map(Self)
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, LedgerError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map(str::trim)
                .map_err(|_| LedgerError::Validation(format!("{name} header is not valid text")))
        })
        .transpose()
}

fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, LedgerError> {
    let id = header(headers, ACCOUNT_ID_HEADER)?
        .ok_or_else(|| LedgerError::Unauthenticated(format!("missing {ACCOUNT_ID_HEADER} header")))?
        .parse::<AccountId>()
        .map_err(|_| LedgerError::Unauthenticated(format!("malformed {ACCOUNT_ID_HEADER} header")))?;
    let role = header(headers, ACCOUNT_ROLE_HEADER)?
        .ok_or_else(|| {
            LedgerError::Unauthenticated(format!("missing {ACCOUNT_ROLE_HEADER} header"))
        })
        .and_then(|r| {
            Role::parse(&r.to_ascii_lowercase()).ok_or_else(|| {
                LedgerError::Unauthenticated(format!("unknown role {r:?}"))
            })
        })?;
    Ok(Actor::new(id, role))
}

fn idempotency_key_from_headers(headers: &HeaderMap) -> Result<Option<String>, LedgerError> {
    match header(headers, IDEMPOTENCY_KEY_HEADER)? {
        None => Ok(None),
        Some("") => Err(LedgerError::Validation(
            "idempotency key must not be empty".to_string(),
        )),
        Some(key) if key.len() > MAX_IDEMPOTENCY_KEY_LEN => Err(LedgerError::Validation(format!(
            "idempotency key longer than {MAX_IDEMPOTENCY_KEY_LEN} bytes"
        ))),
        Some(key) => Ok(Some(key.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            if let Ok(v) = HeaderValue::from_str(value) {
                map.insert(*name, v);
            }
        }
        map
    }

    #[test]
    fn parses_identity() {
        let id = AccountId::new();
        let map = headers(&[
            (ACCOUNT_ID_HEADER, &id.to_string()),
            (ACCOUNT_ROLE_HEADER, "Admin"),
        ]);
        assert_eq!(actor_from_headers(&map), Ok(Actor::new(id, Role::Admin)));
    }

    #[test]
    fn missing_or_bad_identity_is_unauthenticated() {
        assert!(matches!(
            actor_from_headers(&HeaderMap::new()),
            Err(LedgerError::Unauthenticated(_))
        ));
        let map = headers(&[(ACCOUNT_ID_HEADER, "nope"), (ACCOUNT_ROLE_HEADER, "player")]);
        assert!(matches!(
            actor_from_headers(&map),
            Err(LedgerError::Unauthenticated(_))
        ));
        let map = headers(&[
            (ACCOUNT_ID_HEADER, &AccountId::new().to_string()),
            (ACCOUNT_ROLE_HEADER, "root"),
        ]);
        assert!(matches!(
            actor_from_headers(&map),
            Err(LedgerError::Unauthenticated(_))
        ));
    }

    #[test]
    fn idempotency_key_rules() {
        assert_eq!(idempotency_key_from_headers(&HeaderMap::new()), Ok(None));
        let map = headers(&[(IDEMPOTENCY_KEY_HEADER, "abc-1")]);
        assert_eq!(
            idempotency_key_from_headers(&map),
            Ok(Some("abc-1".to_string()))
        );
        let map = headers(&[(IDEMPOTENCY_KEY_HEADER, " ")]);
        assert!(idempotency_key_from_headers(&map).is_err());
        let long = "k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1);
        let map = headers(&[(IDEMPOTENCY_KEY_HEADER, &long)]);
        assert!(idempotency_key_from_headers(&map).is_err());
    }
}
