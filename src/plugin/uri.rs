//! Connection target parsing
//!
//! Plugin URIs look like
//! `ssm[+ssl]://<user>@<host>[:<port>]/?namespace=<ns>[&no_ssl_verify=yes]`.

use crate::error::{Error, Result};
use url::Url;

/// Default port of CIM-XML over HTTPS
pub const WBEM_HTTPS_PORT: u16 = 5989;
/// Default port of CIM-XML over HTTP
pub const WBEM_HTTP_PORT: u16 = 5988;

/// Where and how to reach the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// Use HTTPS
    pub ssl: bool,
    pub host: String,
    pub port: u16,
    /// Username from the URI, empty when absent
    pub username: String,
    /// CIM namespace holding the SSM classes
    pub namespace: String,
    /// Skip certificate verification on HTTPS
    pub no_ssl_verify: bool,
}

impl ConnectionTarget {
    /// Parse a plugin URI
    pub fn parse(uri: &str) -> Result<Self> {
        let url = Url::parse(uri)
            .map_err(|e| Error::InvalidArgument(format!("invalid URI '{}': {}", uri, e)))?;

        let ssl = match url.scheme().to_lowercase().as_str() {
            "ssm+ssl" => true,
            "ssm" => false,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "unsupported URI scheme: {}",
                    other
                )))
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidArgument("host is required.".into()))?
            .to_string();

        let port = url
            .port()
            .unwrap_or(if ssl { WBEM_HTTPS_PORT } else { WBEM_HTTP_PORT });

        let mut namespace = None;
        let mut no_ssl_verify = false;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "namespace" => namespace = Some(value.into_owned()),
                "no_ssl_verify" => no_ssl_verify = value == "yes",
                _ => {}
            }
        }

        let namespace = namespace
            .ok_or_else(|| Error::InvalidArgument("namespace is required.".into()))?;

        let username = urlencoding::decode(url.username())
            .map_err(|e| Error::InvalidArgument(format!("invalid username: {}", e)))?
            .into_owned();

        Ok(Self {
            ssl,
            host,
            port,
            username,
            namespace,
            no_ssl_verify,
        })
    }

    /// HTTP(S) base URL of the CIMOM
    pub fn base_url(&self) -> String {
        let protocol = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", protocol, self.host, self.port)
    }
}
