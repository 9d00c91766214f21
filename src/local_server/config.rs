use std::time::Duration;

pub(crate) const DEFAULT_BIND_HOST: &str = "127.0.0.1";

pub(crate) const DEFAULT_SUCCESS_HTML: &str = r#"<!doctype html>
<html>
  <head><meta charset="utf-8" /><title>Login complete</title></head>
  <body>
    <p>Login complete. You may close this window.</p>
  </body>
</html>
"#;

pub(crate) const DEFAULT_ERROR_HTML: &str = r#"<!doctype html>
<html>
  <head><meta charset="utf-8" /><title>Login error</title></head>
  <body>
    <p>Login failed. You may close this window and try again.</p>
  </body>
</html>
"#;

#[derive(Debug, Clone)]
pub struct LocalServerConfig {
    pub bind_host: String,
    pub redirect_uri: String,
    pub timeout: Option<Duration>,
    pub success_html: String,
    pub error_html: String,
}

impl LocalServerConfig {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            redirect_uri: redirect_uri.into(),
            timeout: None,
            success_html: DEFAULT_SUCCESS_HTML.to_string(),
            error_html: DEFAULT_ERROR_HTML.to_string(),
        }
    }

    pub fn with_bind_host(mut self, bind_host: impl Into<String>) -> Self {
        self.bind_host = bind_host.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_success_html(mut self, html: impl Into<String>) -> Self {
        self.success_html = html.into();
        self
    }

    pub fn with_error_html(mut self, html: impl Into<String>) -> Self {
        self.error_html = html.into();
        self
    }
}
