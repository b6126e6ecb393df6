//! Bearer challenge parsing.
//!
//! When the vault rejects a request it answers with `401 Unauthorized` and a
//! challenge telling the client where to get a token and for which resource:
//!
//! ```text
//! Client                              Vault
//!   |                                    |
//!   |--- GET /secrets (no token) ------->|
//!   |                                    |
//!   |<-- 401 + WWW-Authenticate: --------|
//!   |    Bearer authorization="<idp>",   |
//!   |    resource="<resource>"           |
//! ```
//!
//! [`parse_challenge`] turns that header into an [`AuthChallenge`], which the
//! token acquirer uses to run the client-credentials exchange.

use http::Response;
use http::header::WWW_AUTHENTICATE;

const BEARER_SCHEME: &str = "Bearer";

/// Where to obtain a token, and for which resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Base URL of the authorization server (the `authorization` parameter).
    pub endpoint: String,
    /// Resource identifier to request a token for.
    pub resource: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    #[error("missing WWW-Authenticate header in response")]
    MissingHeader,

    #[error("non-ASCII WWW-Authenticate header")]
    NonAscii,

    #[error("unsupported authentication scheme, expected Bearer")]
    UnsupportedScheme,

    #[error("empty endpoint URI in challenge")]
    EmptyEndpoint,

    #[error("empty resource URI in challenge")]
    EmptyResource,
}

/// Extract the bearer challenge from a response's `WWW-Authenticate` header.
///
/// The caller decides whether the response is a 401; this only looks at the
/// header.
pub fn extract_challenge<B>(response: &Response<B>) -> Result<AuthChallenge, ChallengeError> {
    let Some(www_auth) = response.headers().get(WWW_AUTHENTICATE) else {
        return Err(ChallengeError::MissingHeader);
    };

    let www_auth = www_auth.to_str().map_err(|_| ChallengeError::NonAscii)?;
    parse_challenge(www_auth)
}

/// Parse a `WWW-Authenticate` header value of the form
/// `Bearer authorization="<endpoint>", resource="<resource>"`.
///
/// Parameter order does not matter, values may be quoted or bare, and unknown
/// parameters are ignored. The scheme comparison is case-sensitive.
pub fn parse_challenge(header: &str) -> Result<AuthChallenge, ChallengeError> {
    if header.trim().is_empty() {
        return Err(ChallengeError::MissingHeader);
    }

    let Some((scheme, params)) = header.trim_start().split_once(' ') else {
        return Err(ChallengeError::UnsupportedScheme);
    };
    if scheme != BEARER_SCHEME {
        return Err(ChallengeError::UnsupportedScheme);
    }

    let mut endpoint = "";
    let mut resource = "";
    for param in params.split(',') {
        let Some((key, value)) = param.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key.trim() {
            "authorization" => endpoint = value,
            "resource" => resource = value,
            _ => {}
        }
    }

    if endpoint.is_empty() {
        return Err(ChallengeError::EmptyEndpoint);
    }
    if resource.is_empty() {
        return Err(ChallengeError::EmptyResource);
    }

    Ok(AuthChallenge {
        endpoint: endpoint.to_string(),
        resource: resource.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;

    #[test]
    fn parses_quoted_parameters() {
        let challenge = parse_challenge(
            r#"Bearer authorization="https://login.example.com/tenant", resource="https://vault.example.net""#,
        )
        .unwrap();

        assert_eq!(challenge.endpoint, "https://login.example.com/tenant");
        assert_eq!(challenge.resource, "https://vault.example.net");
    }

    #[test]
    fn parses_regardless_of_order_whitespace_and_quoting() {
        let challenge = parse_challenge(
            "Bearer   resource=https://vault.example.net ,  realm=\"ignored\",authorization=https://login.example.com",
        )
        .unwrap();

        assert_eq!(challenge.endpoint, "https://login.example.com");
        assert_eq!(challenge.resource, "https://vault.example.net");
    }

    #[test]
    fn rejects_empty_header() {
        assert_eq!(parse_challenge(""), Err(ChallengeError::MissingHeader));
        assert_eq!(parse_challenge("   "), Err(ChallengeError::MissingHeader));
    }

    #[test]
    fn rejects_other_schemes() {
        assert_eq!(
            parse_challenge(r#"Basic realm="vault""#),
            Err(ChallengeError::UnsupportedScheme)
        );
        assert_eq!(
            parse_challenge(r#"bearer authorization="a", resource="b""#),
            Err(ChallengeError::UnsupportedScheme)
        );
        assert_eq!(parse_challenge("Bearer"), Err(ChallengeError::UnsupportedScheme));
    }

    #[test]
    fn rejects_missing_authorization() {
        assert_eq!(
            parse_challenge(r#"Bearer resource="https://vault.example.net""#),
            Err(ChallengeError::EmptyEndpoint)
        );
        assert_eq!(
            parse_challenge(r#"Bearer authorization="", resource="r""#),
            Err(ChallengeError::EmptyEndpoint)
        );
    }

    #[test]
    fn rejects_missing_resource() {
        assert_eq!(
            parse_challenge(r#"Bearer authorization="https://login.example.com""#),
            Err(ChallengeError::EmptyResource)
        );
        assert_eq!(
            parse_challenge(r#"Bearer authorization="https://login.example.com", resource"#),
            Err(ChallengeError::EmptyResource)
        );
    }

    #[test]
    fn extract_reports_missing_header() {
        let response = Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .body(Full::<Bytes>::new(Bytes::new()))
            .unwrap();

        assert_eq!(
            extract_challenge(&response),
            Err(ChallengeError::MissingHeader)
        );
    }

    #[test]
    fn extract_reads_www_authenticate() {
        let response = Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .header(
                WWW_AUTHENTICATE,
                r#"Bearer authorization="https://login.example.com", resource="https://vault.example.net""#,
            )
            .body(Full::<Bytes>::new(Bytes::new()))
            .unwrap();

        let challenge = extract_challenge(&response).unwrap();
        assert_eq!(challenge.endpoint, "https://login.example.com");
    }
}
