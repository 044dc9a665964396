//! CIM-XML over HTTP(S) session
//!
//! Posts CIM-XML requests to `<url>/cimom` and maps every failure onto a
//! [`CimFault`] whose description follows the wording the classifier keys on
//! ("Socket error: [Errno N]", "SSL error", "HTTP error").

use crate::domain::ports::{
    CimFault, CimInstance, CimValue, InstancePath, MethodOutput, WbemSession,
};
use crate::wbem::xml;
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::error::Error as StdError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the HTTP session
#[derive(Debug, Clone)]
pub struct WbemClientConfig {
    /// Base URL, e.g. `https://array:5989`
    pub url: String,
    /// CIM namespace, e.g. `root/huawei`
    pub namespace: String,
    pub username: String,
    pub password: String,
    /// Accept any server certificate
    pub no_ssl_verify: bool,
    /// Initial timeout of every request
    pub timeout: Duration,
}

impl Default for WbemClientConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5988".to_string(),
            namespace: "root/ssm".to_string(),
            username: String::new(),
            password: String::new(),
            no_ssl_verify: false,
            timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Fault Mapping
// =============================================================================

/// First OS level I/O error below the request error
fn os_error(err: &reqwest::Error) -> Option<&std::io::Error> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.raw_os_error().is_some() {
                return Some(io);
            }
        }
        source = cause.source();
    }
    None
}

/// Whether a cause chain reports a TLS failure. Only the causes are looked
/// at: the request error itself renders the URL, which may contain anything.
fn is_tls_failure(mut source: Option<&(dyn StdError + 'static)>) -> bool {
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::InvalidData {
                return true;
            }
        }
        let lowered = cause.to_string().to_lowercase();
        if lowered.contains("certificate") || lowered.contains("handshake") {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Translate a reqwest failure into the fault shape a WBEM client reports
pub fn fault_from_reqwest(err: reqwest::Error) -> CimFault {
    // reqwest renders its whole cause chain in Display
    let text = err.to_string();

    if err.is_timeout() {
        return CimFault::Http(format!("Request timed out: {}", text));
    }

    if let Some((errno, io)) = os_error(&err).and_then(|io| io.raw_os_error().map(|n| (n, io))) {
        return CimFault::Cim {
            code: 0,
            description: format!("Socket error: [Errno {}] {}", errno, io),
        };
    }

    if is_tls_failure(err.source()) {
        return CimFault::Cim {
            code: 0,
            description: format!("SSL error: {}", text),
        };
    }

    if err.is_connect() {
        return CimFault::Cim {
            code: 0,
            description: format!("Socket error: {}", text),
        };
    }

    CimFault::Http(text)
}

// =============================================================================
// HTTP Session
// =============================================================================

/// [`WbemSession`] speaking CIM-XML over HTTP(S)
pub struct HttpWbemSession {
    client: reqwest::Client,
    config: WbemClientConfig,
    timeout: RwLock<Duration>,
    message_id: AtomicU64,
}

impl HttpWbemSession {
    pub fn new(config: WbemClientConfig) -> Result<Self, CimFault> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.no_ssl_verify)
            .build()
            .map_err(|e| CimFault::Http(format!("Unable to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout: RwLock::new(config.timeout),
            config,
            message_id: AtomicU64::new(1000),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    fn next_message_id(&self) -> u64 {
        self.message_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn post(
        &self,
        cim_method: &str,
        cim_object: &str,
        body: String,
    ) -> Result<String, CimFault> {
        let timeout = *self.timeout.read();
        trace!("CIM-XML request {}:\n{}", cim_method, body);

        let response = self
            .client
            .post(format!("{}/cimom", self.config.url))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header(CONTENT_TYPE, "application/xml; charset=\"utf-8\"")
            .header("CIMOperation", "MethodCall")
            .header("CIMMethod", cim_method)
            .header("CIMObject", urlencoding::encode(cim_object).into_owned())
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(fault_from_reqwest)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(CimFault::Auth(format!("{} for user {}", status, self.config.username)));
        }
        if !status.is_success() {
            let detail = response
                .headers()
                .get("CIMError")
                .and_then(|v| v.to_str().ok())
                .map(|v| format!(" (CIMError: {})", v))
                .unwrap_or_default();
            return Err(CimFault::Cim {
                code: 0,
                description: format!("HTTP error: {}{}", status, detail),
            });
        }

        let text = response.text().await.map_err(fault_from_reqwest)?;
        trace!("CIM-XML response {}:\n{}", cim_method, text);
        Ok(text)
    }
}

#[async_trait]
impl WbemSession for HttpWbemSession {
    async fn enumerate_instances(&self, class_name: &str) -> Result<Vec<CimInstance>, CimFault> {
        debug!("EnumerateInstances {}", class_name);
        let body = xml::enumerate_instances_request(
            self.next_message_id(),
            &self.config.namespace,
            class_name,
        )?;
        let text = self
            .post("EnumerateInstances", &self.config.namespace, body)
            .await?;
        xml::decode_enumerate_instances(&text)
    }

    async fn get_instance(&self, path: &InstancePath) -> Result<CimInstance, CimFault> {
        debug!("GetInstance {}", path);
        let namespace = path.namespace.as_deref().unwrap_or(&self.config.namespace);
        let body = xml::get_instance_request(self.next_message_id(), namespace, path)?;
        let text = self.post("GetInstance", namespace, body).await?;
        xml::decode_get_instance(&text, path)
    }

    async fn invoke_method(
        &self,
        method: &str,
        target: &InstancePath,
        params: Vec<(String, CimValue)>,
    ) -> Result<MethodOutput, CimFault> {
        debug!("InvokeMethod {} on {}", method, target);
        let mut object = target.clone();
        if object.namespace.is_none() {
            object.namespace = Some(self.config.namespace.clone());
        }
        let body = xml::method_call_request(
            self.next_message_id(),
            &self.config.namespace,
            method,
            target,
            &params,
        )?;
        let text = self.post(method, &object.to_string(), body).await?;
        xml::decode_method_response(&text)
    }

    fn set_timeout(&self, timeout: Duration) {
        *self.timeout.write() = timeout;
    }
}
