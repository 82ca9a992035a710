//! Bearer-token authentication extractors.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use forum_shared::{bearer_token, Identity};

use crate::error::AppError;
use crate::state::AppState;

/// Authenticated caller. Rejects with 401 unless the `Authorization` header
/// carries a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

/// Caller identity if one was presented. Reads the `Authorization` header
/// first, then a `token` query parameter (browsers cannot set headers on a
/// websocket upgrade). Invalid tokens degrade to `None`.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<Identity>);

fn header_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string)
}

fn query_token(parts: &Parts) -> Option<String> {
    let query = parts.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, value)| key == "token" && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    fn from_request_parts(parts: &mut Parts, state: &S) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let app_state = AppState::from_ref(state);
        let token = header_token(parts);

        async move {
            let token = token.ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;
            let identity = app_state.tokens.verify(&token).map_err(|e| {
                tracing::warn!(error = %e, "Rejected bearer token");
                AppError::Unauthorized("invalid token".to_string())
            })?;
            Ok(AuthUser(identity))
        }
    }
}

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts(parts: &mut Parts, state: &S) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let app_state = AppState::from_ref(state);
        let token = header_token(parts).or_else(|| query_token(parts));

        async move {
            let Some(token) = token else {
                return Ok(MaybeAuthUser(None));
            };
            match app_state.tokens.verify(&token) {
                Ok(identity) => Ok(MaybeAuthUser(Some(identity))),
                Err(e) => {
                    tracing::debug!(error = %e, "Ignoring invalid token");
                    Ok(MaybeAuthUser(None))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(uri: &str, auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn token_from_header() {
        assert_eq!(header_token(&parts("/", Some("Bearer abc"))).as_deref(), Some("abc"));
        assert_eq!(header_token(&parts("/", Some("Basic abc"))), None);
        assert_eq!(header_token(&parts("/", None)), None);
    }

    #[test]
    fn token_from_query() {
        assert_eq!(query_token(&parts("/ws?token=xyz", None)).as_deref(), Some("xyz"));
        assert_eq!(query_token(&parts("/ws?a=1&token=xyz", None)).as_deref(), Some("xyz"));
        assert_eq!(query_token(&parts("/ws?token=", None)), None);
        assert_eq!(query_token(&parts("/ws", None)), None);
    }

    #[test]
    fn query_token_is_percent_decoded() {
        assert_eq!(
            query_token(&parts("/ws?token=aaa%2Ebbb%2Eccc", None)).as_deref(),
            Some("aaa.bbb.ccc")
        );
        assert_eq!(query_token(&parts("/ws?token=a%2Bb%3D", None)).as_deref(), Some("a+b="));
    }
}
