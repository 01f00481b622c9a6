use std::time::Duration;

use ureq::Agent;
use ureq::tls::TlsConfig;

/// Browser-like identity used for landing-page and login requests. Several
/// publishers refuse plainly identified clients outright.
pub const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build an agent with a global timeout, optionally with TLS verification
/// switched off for the insecure fallback path.
pub fn build_agent(timeout: Duration, verify_tls: bool) -> Agent {
    let tls = if verify_tls {
        TlsConfig::builder().build()
    } else {
        TlsConfig::builder().disable_verification(true).build()
    };
    let config = Agent::config_builder()
        .timeout_connect(Some(CONNECT_TIMEOUT))
        .timeout_global(Some(timeout))
        .tls_config(tls)
        .build();
    Agent::new_with_config(config)
}

/// Whether a request failed purely on certificate validation. Only such
/// failures may be retried over the insecure transport.
pub fn is_certificate_error(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Tls(_) => true,
        other => {
            let message = other.to_string().to_ascii_lowercase();
            message.contains("certificate") || message.contains("invalidcertificate")
        }
    }
}
