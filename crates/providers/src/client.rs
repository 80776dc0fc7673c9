use reqwest::{Client, Proxy};
use std::time::Duration;
use tracing::{info, warn};

/// Effective proxy decision for one target URL.
#[derive(Debug, PartialEq)]
enum ProxyChoice {
    Use(String),
    Direct,
    /// Leave reqwest to read HTTPS_PROXY / HTTP_PROXY itself.
    Environment,
}

/// Host matching for `noProxy` rules: exact host, `*.suffix` (subdomains
/// only) and `.suffix` (the domain and its subdomains).
fn host_bypasses_proxy(host: &str, rules: &[String]) -> bool {
    let host = host.to_lowercase();
    rules.iter().any(|rule| {
        let rule = rule.trim().to_lowercase();
        if rule.is_empty() {
            false
        } else if let Some(suffix) = rule.strip_prefix("*.") {
            host.ends_with(&format!(".{}", suffix))
        } else if let Some(suffix) = rule.strip_prefix('.') {
            host == suffix || host.ends_with(&format!(".{}", suffix))
        } else {
            host == rule
        }
    })
}

fn host_of(target: &str) -> Option<String> {
    url::Url::parse(target)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_matches(|c| c == '[' || c == ']').to_string()))
}

/// Precedence: per-provider proxy (`""` means direct), then the global
/// proxy unless the target host is listed in `no_proxy`, then environment.
fn choose_proxy(
    provider_proxy: Option<&str>,
    global_proxy: Option<&str>,
    no_proxy: &[String],
    target: &str,
) -> ProxyChoice {
    match provider_proxy {
        Some("") => return ProxyChoice::Direct,
        Some(p) => return ProxyChoice::Use(p.to_string()),
        None => {}
    }

    match global_proxy {
        Some(global) if !global.is_empty() => {
            let bypass = host_of(target)
                .map(|h| host_bypasses_proxy(&h, no_proxy))
                .unwrap_or(false);
            if bypass {
                ProxyChoice::Direct
            } else {
                ProxyChoice::Use(global.to_string())
            }
        }
        _ => ProxyChoice::Environment,
    }
}

/// Options shared by the provider clients and the résumé downloader.
#[derive(Debug, Clone, Default)]
pub struct HttpClientOptions<'a> {
    pub provider_proxy: Option<&'a str>,
    pub global_proxy: Option<&'a str>,
    pub no_proxy: &'a [String],
    pub user_agent: Option<&'a str>,
}

/// Build a reqwest client for `target` with the resolved proxy settings.
/// An invalid proxy URL is logged and ignored.
pub fn build_http_client(target: &str, timeout: Duration, opts: &HttpClientOptions<'_>) -> Client {
    let mut builder = Client::builder().timeout(timeout);
    if let Some(ua) = opts.user_agent.filter(|ua| !ua.is_empty()) {
        builder = builder.user_agent(ua.to_string());
    }

    match choose_proxy(opts.provider_proxy, opts.global_proxy, opts.no_proxy, target) {
        ProxyChoice::Use(proxy_url) => match Proxy::all(&proxy_url) {
            Ok(p) => {
                info!(proxy = %proxy_url, target = %target, "Using HTTP proxy");
                builder = builder.proxy(p);
            }
            Err(e) => {
                warn!(error = %e, proxy = %proxy_url, "Invalid proxy URL, ignoring");
            }
        },
        ProxyChoice::Direct => {
            info!(target = %target, "Proxy disabled for target");
            builder = builder.no_proxy();
        }
        ProxyChoice::Environment => {}
    }

    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build HTTP client, using default");
        Client::new()
    })
}
