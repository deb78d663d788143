//! CLI argument parsing, key loading, and policy construction.

use std::time::Duration;

use clap::Parser;
use tracing::error;

use crate::auth::{ConfigError, CookieDomain, SameSite};
use crate::jwt::{is_symmetric, parse_algorithm};
use crate::policy::{CookieOptions, JwtPolicy};

const MIN_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "cookiejwt", about = "JWT authentication with cookie transport")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7291")]
    pub port: u16,

    /// Path to file containing the signing secret or private key. Prefer JWT_PRIVATE_KEY
    #[arg(long)]
    pub private_key_file: Option<String>,

    /// Path to file containing the verification key for asymmetric algorithms. Prefer JWT_PUBLIC_KEY
    #[arg(long)]
    pub public_key_file: Option<String>,

    /// Signing algorithm (HS256, HS384, HS512, RS256, ES256, EdDSA, ...)
    #[arg(long, default_value = "HS512")]
    pub algorithm: String,

    /// Token lifetime in seconds; 0 issues tokens without expiry
    #[arg(long, default_value = "0")]
    pub expiration: u64,

    /// Clock skew tolerated when checking expiry, in seconds
    #[arg(long, default_value = "0")]
    pub leeway: u64,

    /// Audience written to and required from every token
    #[arg(long)]
    pub audience: Option<String>,

    /// Header carrying the token
    #[arg(long, default_value = "Authorization")]
    pub header_name: String,

    /// Scheme expected in the Authorization header
    #[arg(long, default_value = "JWT")]
    pub scheme: String,

    /// Carry the token in a cookie instead of the header
    #[arg(long)]
    pub cookie: bool,

    /// Name of the token cookie
    #[arg(long, default_value = "Authorization")]
    pub cookie_name: String,

    /// Allow the cookie over plain HTTP (omit the Secure attribute)
    #[arg(long)]
    pub insecure_cookie: bool,

    /// SameSite attribute of the cookie (Strict, Lax or None)
    #[arg(long)]
    pub same_site: Option<String>,

    /// Path attribute of the cookie
    #[arg(long, default_value = "/")]
    pub cookie_path: String,

    /// Domain attribute; repeat to emit one cookie per domain. Defaults to the request host
    #[arg(long)]
    pub cookie_domain: Vec<String>,

    /// Omit the Domain attribute
    #[arg(long, conflicts_with = "cookie_domain")]
    pub host_only: bool,

    /// Reissue cookie tokens older than this many seconds
    #[arg(long)]
    pub reissue_time: Option<u64>,

    /// Also accept tokens from the header when using the cookie
    #[arg(long)]
    pub accept_header: bool,

    /// With --accept-header, prefer the header over the cookie
    #[arg(long, requires = "accept_header")]
    pub header_first: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load key material from an environment variable or a file.
///
/// Returns `Ok(None)` when neither is set. The variable is cleared after
/// reading.
pub fn load_key(env_var: &str, file: Option<&str>) -> Result<Option<Vec<u8>>, String> {
    if let Ok(key) = std::env::var(env_var) {
        // SAFETY: called during startup before any other thread reads the environment.
        unsafe { std::env::remove_var(env_var) };
        return Ok(Some(key.into_bytes()));
    }
    match file {
        Some(path) => std::fs::read(path)
            .map(Some)
            .map_err(|e| format!("Failed to read {}: {}", path, e)),
        None => Ok(None),
    }
}

/// Load the signing and verification keys for `args`.
/// Returns None and logs an error if a required key is missing.
pub fn load_keys(args: &Args) -> Option<(Vec<u8>, Option<Vec<u8>>)> {
    let private_key = match load_key("JWT_PRIVATE_KEY", args.private_key_file.as_deref()) {
        Ok(Some(key)) => key,
        Ok(None) => {
            error!(
                "Signing key is required. Set JWT_PRIVATE_KEY environment variable (recommended) or use --private-key-file"
            );
            return None;
        }
        Err(e) => {
            error!(error = %e, "Failed to load signing key");
            return None;
        }
    };

    let public_key = match load_key("JWT_PUBLIC_KEY", args.public_key_file.as_deref()) {
        Ok(key) => key,
        Err(e) => {
            error!(error = %e, "Failed to load verification key");
            return None;
        }
    };

    Some((private_key, public_key))
}

/// Build the policy from validated arguments.
pub fn build_policy(
    args: &Args,
    private_key: Vec<u8>,
    public_key: Option<Vec<u8>>,
) -> Result<JwtPolicy, ConfigError> {
    let algorithm = parse_algorithm(&args.algorithm)?;
    if is_symmetric(algorithm) {
        let secret = String::from_utf8_lossy(&private_key);
        if secret.trim().len() < MIN_SECRET_LENGTH {
            tracing::warn!(
                "Signing secret is shorter than {} characters. Use a longer secret",
                MIN_SECRET_LENGTH
            );
        }
    }

    let mut builder = JwtPolicy::builder(private_key)
        .algorithm(algorithm)
        .leeway(Duration::from_secs(args.leeway))
        .header_name(&args.header_name)
        .scheme(&args.scheme);
    if let Some(public_key) = public_key {
        builder = builder.public_key(public_key);
    }
    if args.expiration > 0 {
        builder = builder.expiration(Duration::from_secs(args.expiration));
    }
    if let Some(audience) = &args.audience {
        builder = builder.audience(audience);
    }
    if args.cookie {
        builder = builder.cookie(cookie_options(args)?);
    }
    builder.build()
}

fn cookie_options(args: &Args) -> Result<CookieOptions, ConfigError> {
    let same_site = args
        .same_site
        .as_deref()
        .map(str::parse::<SameSite>)
        .transpose()?;
    let domain = if args.host_only {
        CookieDomain::HostOnly
    } else if !args.cookie_domain.is_empty() {
        CookieDomain::Fixed(args.cookie_domain.clone())
    } else {
        CookieDomain::RequestHost
    };

    let mut options = CookieOptions::default()
        .name(&args.cookie_name)
        .https_only(!args.insecure_cookie)
        .same_site(same_site)
        .path(&args.cookie_path)
        .domain(domain)
        .accept_header(args.accept_header)
        .header_first(args.header_first);
    if let Some(reissue_time) = args.reissue_time {
        options = options.reissue_time(Duration::from_secs(reissue_time));
    }
    Ok(options)
}
