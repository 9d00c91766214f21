use url::Url;

use crate::AuthError;

#[derive(Debug, Clone)]
pub(super) struct RedirectTarget {
    url: Url,
    pub(super) port: u16,
    pub(super) path: String,
}

impl RedirectTarget {
    pub(super) fn parse(redirect_uri: &str) -> Result<Self, AuthError> {
        let url = Url::parse(redirect_uri)?;
        if url.scheme() != "http" {
            return Err(AuthError::InvalidRedirectUri(
                "redirect uri must use http scheme".to_string(),
            ));
        }

        if url.host_str().is_none() {
            return Err(AuthError::InvalidRedirectUri(
                "redirect uri is missing host".to_string(),
            ));
        }

        let port = url.port_or_known_default().ok_or_else(|| {
            AuthError::InvalidRedirectUri("redirect uri is missing port".to_string())
        })?;

        Ok(Self {
            path: url.path().to_string(),
            port,
            url,
        })
    }

    pub(super) fn uri_with_port(&self, port: u16) -> String {
        let mut url = self.url.clone();
        // Only fails for cannot-be-a-base urls, which parse() already excluded.
        let _ = url.set_port(Some(port));
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::RedirectTarget;

    #[test]
    fn parses_redirect_target() {
        let target = RedirectTarget::parse("http://localhost:8676/callback").unwrap();
        assert_eq!(target.port, 8676);
        assert_eq!(target.path, "/callback");
        assert_eq!(target.uri_with_port(8676), "http://localhost:8676/callback");
    }

    #[test]
    fn rewrites_ephemeral_port() {
        let target = RedirectTarget::parse("http://127.0.0.1:0/callback").unwrap();
        assert_eq!(target.port, 0);
        assert_eq!(target.uri_with_port(40123), "http://127.0.0.1:40123/callback");
    }

    #[test]
    fn rejects_https_redirect() {
        assert!(RedirectTarget::parse("https://localhost:8676/callback").is_err());
    }
}
