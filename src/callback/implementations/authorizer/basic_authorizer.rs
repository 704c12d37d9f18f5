// Authorizer: HTTP basic authentication against a fixed credentials list
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::collections::HashMap;

use crate::callback::{Callback, CallbackError};
use crate::context::Context;

/// Denies every request whose `Authorization: Basic` credentials are not in
/// the list.
pub struct BasicAuthorizer {
    credentials: HashMap<String, String>,
}

impl BasicAuthorizer {
    pub fn new<I, U, P>(credentials: I) -> Self
    where
        I: IntoIterator<Item = (U, P)>,
        U: Into<String>,
        P: Into<String>,
    {
        Self {
            credentials: credentials
                .into_iter()
                .map(|(user, password)| (user.into(), password.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl Callback for BasicAuthorizer {
    fn name(&self) -> &str {
        "BasicAuthorizer"
    }

    async fn run(&self, ctx: &mut Context) -> Result<(), CallbackError> {
        match basic_credentials(&ctx.headers) {
            Some((user, password)) if self.credentials.get(&user) == Some(&password) => Ok(()),
            _ => Err(CallbackError::access_denied()),
        }
    }
}

/// Extract user and password from a basic authorization header
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn decodes_basic_credentials() {
        let mut headers = HeaderMap::new();
        assert_eq!(basic_credentials(&headers), None);

        let encoded = STANDARD.encode("alice:secret");
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap());
        assert_eq!(basic_credentials(&headers), Some(("alice".to_string(), "secret".to_string())));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(basic_credentials(&headers), None);
    }
}
