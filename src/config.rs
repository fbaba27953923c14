use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt, str::FromStr};

/// Default upload ceiling: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; built once at startup.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_upload_bytes: usize,
    pub ftp: FtpConfig,
    pub urls: UrlConfig,
}

/// Connection settings for the remote file server.
#[derive(Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Remote directory under which `originals/` and `optimized/` live.
    pub base_path: String,
}

/// Prefixes used to build the URLs stored alongside each image.
#[derive(Debug, Clone)]
pub struct UrlConfig {
    /// Storage-side location of the uploads directory.
    pub storage_base_url: String,
    /// Public site origin, e.g. `https://example.com`.
    pub public_base_url: String,
    /// Path of the uploads directory as served by the public site.
    pub public_uploads_path: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Image upload and FTP publishing service")]
pub struct Args {
    /// Host to bind to (overrides IMAGE_PUBLISHER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGE_PUBLISHER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides IMAGE_PUBLISHER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Largest accepted image in bytes (overrides IMAGE_PUBLISHER_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// FTP server host (overrides FTP_HOST)
    #[arg(long)]
    pub ftp_host: Option<String>,

    /// FTP server port (overrides FTP_PORT)
    #[arg(long)]
    pub ftp_port: Option<u16>,

    /// FTP user name (overrides FTP_USER)
    #[arg(long)]
    pub ftp_user: Option<String>,

    /// FTP password (overrides FTP_PASSWORD)
    #[arg(long)]
    pub ftp_password: Option<String>,

    /// Remote uploads directory (overrides FTP_BASE_PATH)
    #[arg(long)]
    pub ftp_base_path: Option<String>,

    /// Storage base URL recorded for each rendition (overrides FTP_BASE_URL)
    #[arg(long)]
    pub ftp_base_url: Option<String>,

    /// Public site origin (overrides PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Public path of the uploads directory (overrides PUBLIC_UPLOADS_PATH)
    #[arg(long)]
    pub public_uploads_path: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    fn from_args(args: Args) -> Result<Self> {
        let host = args
            .host
            .unwrap_or_else(|| env_or("IMAGE_PUBLISHER_HOST", "0.0.0.0"));
        let port = match args.port {
            Some(port) => port,
            None => env_parse("IMAGE_PUBLISHER_PORT", 3000)?,
        };
        let database_url = args.database_url.unwrap_or_else(|| {
            env_or("IMAGE_PUBLISHER_DATABASE_URL", "sqlite://./data/images.db")
        });
        let max_upload_bytes = match args.max_upload_bytes {
            Some(max) => max,
            None => env_parse("IMAGE_PUBLISHER_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
        };

        // Credentials have no fallback.
        let user = match args.ftp_user {
            Some(user) => user,
            None => env::var("FTP_USER").context("FTP_USER (or --ftp-user) must be set")?,
        };
        let password = match args.ftp_password {
            Some(password) => password,
            None => {
                env::var("FTP_PASSWORD").context("FTP_PASSWORD (or --ftp-password) must be set")?
            }
        };

        let ftp = FtpConfig {
            host: args.ftp_host.unwrap_or_else(|| env_or("FTP_HOST", "localhost")),
            port: match args.ftp_port {
                Some(port) => port,
                None => env_parse("FTP_PORT", 21)?,
            },
            user,
            password,
            base_path: args
                .ftp_base_path
                .unwrap_or_else(|| env_or("FTP_BASE_PATH", "/public_html/uploads")),
        };

        let urls = UrlConfig {
            storage_base_url: args
                .ftp_base_url
                .unwrap_or_else(|| env_or("FTP_BASE_URL", "/public_html/uploads")),
            public_base_url: args
                .public_base_url
                .unwrap_or_else(|| env_or("PUBLIC_BASE_URL", "http://localhost:3000")),
            public_uploads_path: args
                .public_uploads_path
                .unwrap_or_else(|| env_or("PUBLIC_UPLOADS_PATH", "/uploads")),
        };

        Ok(Self {
            host,
            port,
            database_url,
            max_upload_bytes,
            ftp,
            urls,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FtpConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("ftp", &self.ftp)
            .field("urls", &self.urls)
            .finish()
    }
}

impl fmt::Debug for FtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("base_path", &self.base_path)
            .finish()
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args {
            host: Some("127.0.0.1".into()),
            port: Some(8080),
            database_url: Some("sqlite::memory:".into()),
            max_upload_bytes: Some(1024),
            ftp_host: Some("ftp.example.com".into()),
            ftp_port: Some(2121),
            ftp_user: Some("deploy".into()),
            ftp_password: Some("s3cret".into()),
            ftp_base_path: Some("/srv/uploads".into()),
            ftp_base_url: Some("/srv/uploads".into()),
            public_base_url: Some("https://cdn.example.com".into()),
            public_uploads_path: Some("/media".into()),
            migrate: false,
        }
    }

    #[test]
    fn cli_arguments_take_precedence() {
        let cfg = AppConfig::from_args(args()).unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:8080");
        assert_eq!(cfg.max_upload_bytes, 1024);
        assert_eq!(cfg.ftp.addr(), "ftp.example.com:2121");
        assert_eq!(cfg.ftp.base_path, "/srv/uploads");
        assert_eq!(cfg.urls.public_uploads_path, "/media");
    }

    #[test]
    fn debug_output_hides_password() {
        let cfg = AppConfig::from_args(args()).unwrap();
        let rendered = format!("{:?}", cfg);
        assert!(rendered.contains("deploy"));
        assert!(!rendered.contains("s3cret"));
    }
}
