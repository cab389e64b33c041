//! Configuration loading: `.env` file, environment and command line

use crate::cli::Cli;
use crate::error::Result;
use crate::models::PingConfig;
use crate::types::{DnsMode, IpFamily};
use std::path::PathBuf;

/// Load a `.env` file from the working directory or its parents, if any
///
/// Must run before the command line is parsed so that `HTTP_PING_*`
/// variables defined there act as defaults.
pub fn load_env_file() -> Result<Option<PathBuf>> {
    match dotenv::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Turn parsed arguments into a validated ping configuration
pub fn load_config(cli: &Cli) -> Result<PingConfig> {
    let ip_family = if cli.ipv4 {
        IpFamily::V4
    } else if cli.ipv6 {
        IpFamily::V6
    } else {
        IpFamily::Any
    };

    let dns = match (&cli.dns_server, cli.dns_full_resolution) {
        (_, true) => DnsMode::FullRoot,
        (Some(server), false) => DnsMode::Server(server.clone()),
        (None, false) => DnsMode::System,
    };

    let config = PingConfig {
        target: cli.target.clone(),
        method: cli.method.to_uppercase(),
        ip_family,
        wait: cli.wait,
        interval: cli.interval,
        count: (cli.count > 0).then_some(cli.count),
        keep_alive: !cli.disable_keepalive,
        follow_redirects: cli.follow_redirects,
        conn_target: cli.conn_target.clone(),
        dns,
        cache_dns: cli.dns_cache,
        no_check_certificate: cli.insecure,
        disable_compression: cli.disable_compression,
        disable_http2: cli.disable_http2,
        user_agent: cli.user_agent.clone(),
        referrer: cli.referrer.clone(),
        auth_username: cli.auth_user.clone(),
        auth_password: cli.auth_password.clone(),
        headers: cli.headers.clone(),
        parameters: cli.parameters.clone(),
        cookies: cli.cookies.clone(),
        extra_parameter: cli.extra_parameter,
        ignore_server_errors: cli.ignore_server_errors,
        keep_cookies: cli.keep_cookies,
        log_level: cli.log_level(),
    };

    config.validate()?;
    Ok(config)
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &PingConfig) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Target: {} {}", config.method, config.target));
    summary.push(format!("IP family: {}", config.ip_family));
    summary.push(format!("DNS: {}{}", config.dns.name(), if config.cache_dns { " (cached)" } else { "" }));
    summary.push(format!(
        "Count: {}",
        config.count.map_or_else(|| "unbounded".to_string(), |c| c.to_string())
    ));
    summary.push(format!("Interval: {:?}", config.interval));
    summary.push(format!("Wait: {:?}", config.wait));
    summary.push(format!("Keep-alive: {}", config.keep_alive));
    if let Some(target) = &config.conn_target {
        summary.push(format!("Connect target: {}", target));
    }

    summary.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("http-ping").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_map_to_config() {
        let config = load_config(&cli(&["https://example.com/"])).unwrap();
        assert_eq!(config.count, Some(10));
        assert_eq!(config.ip_family, IpFamily::Any);
        assert_eq!(config.dns, DnsMode::System);
        assert!(config.keep_alive);
        assert!(!config.no_check_certificate);
    }

    #[test]
    fn test_zero_count_is_unbounded() {
        let config = load_config(&cli(&["-c", "0", "https://example.com/"])).unwrap();
        assert_eq!(config.count, None);
    }

    #[test]
    fn test_flags_map_to_config() {
        let config = load_config(&cli(&[
            "-6",
            "-K",
            "-k",
            "-X",
            "head",
            "--dns-server",
            "192.0.2.53",
            "--dns-cache",
            "--conn-target",
            "[2001:db8::1]:8443",
            "https://example.com/",
        ]))
        .unwrap();

        assert_eq!(config.ip_family, IpFamily::V6);
        assert!(!config.keep_alive);
        assert!(config.no_check_certificate);
        assert_eq!(config.method, "HEAD");
        assert_eq!(config.dns, DnsMode::Server("192.0.2.53".to_string()));
        assert!(config.cache_dns);
        assert_eq!(config.conn_target.as_deref(), Some("[2001:db8::1]:8443"));
    }

    #[test]
    fn test_invalid_target_rejected() {
        let result = load_config(&cli(&["ftp://example.com/"]));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_summary_mentions_dns_mode() {
        let config = load_config(&cli(&["--dns-full-resolution", "--dns-cache", "http://example.com/"])).unwrap();
        let summary = display_config_summary(&config);
        assert!(summary.contains("DNS: full resolution (cached)"));
        assert!(summary.contains("Count: 10"));
    }
}
