//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server
//! and the per-directory override file. All types derive Serde traits for
//! deserialization from TOML.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::rules::RuleMap;

/// Name of the per-directory override file.
pub const OVERRIDE_FILE_NAME: &str = ".molly";

/// Name of the file replacing the default directory listing heading.
pub const LISTING_HEADER_FILE_NAME: &str = ".mollyhead";

/// Root configuration for the capsule server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Hostname requests must be addressed to.
    pub hostname: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Server certificate chain (PEM).
    pub cert_path: PathBuf,

    /// Server private key (PEM).
    pub key_path: PathBuf,

    /// Document root.
    pub doc_base: PathBuf,

    /// Subdirectory of the document root holding `~user` trees.
    pub home_doc_base: String,

    /// Extension (without dot) served as `text/gemini`.
    pub gemini_ext: String,

    /// Language tag appended to `text/gemini` responses, empty for none.
    pub default_lang: String,

    /// Access log file.
    pub access_log: PathBuf,

    /// Diagnostic log file. Diagnostics go to stderr when unset.
    pub error_log: Option<PathBuf>,

    /// Diagnostic log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Honour per-directory override files.
    pub read_override_files: bool,

    pub temp_redirects: RuleMap<String>,
    pub perm_redirects: RuleMap<String>,

    /// Filesystem path pattern → MIME type. Last match wins.
    pub mime_overrides: RuleMap<String>,

    /// Directories whose executables are run as CGI scripts.
    pub cgi_paths: Vec<PathBuf>,

    /// URL path prefix → Unix socket of an SCGI application.
    pub scgi_paths: RuleMap<PathBuf>,

    /// URL path pattern → authorised certificate fingerprints.
    pub certificate_zones: RuleMap<Vec<String>>,

    pub directory_sort: SortKey,
    pub directory_reverse: bool,
    pub directory_titles: bool,

    /// Connection and gateway limits.
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: 1965,
            cert_path: PathBuf::from("cert.pem"),
            key_path: PathBuf::from("key.pem"),
            doc_base: PathBuf::from("/var/gemini/"),
            home_doc_base: "users".to_string(),
            gemini_ext: "gmi".to_string(),
            default_lang: String::new(),
            access_log: PathBuf::from("access.log"),
            error_log: None,
            log_level: "info".to_string(),
            read_override_files: true,
            temp_redirects: RuleMap::new(),
            perm_redirects: RuleMap::new(),
            mime_overrides: RuleMap::new(),
            cgi_paths: Vec::new(),
            scgi_paths: RuleMap::new(),
            certificate_zones: RuleMap::new(),
            directory_sort: SortKey::Name,
            directory_reverse: false,
            directory_titles: false,
            limits: LimitsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Apply one override file on top of this configuration.
    ///
    /// Scalars present in the file replace the current value; tables are
    /// merged with the file's entries winning on collision.
    pub fn apply_override(&mut self, file: OverrideFile) {
        if let Some(ext) = file.gemini_ext {
            self.gemini_ext = ext;
        }
        if let Some(lang) = file.default_lang {
            self.default_lang = lang;
        }
        if let Some(sort) = file.directory_sort {
            self.directory_sort = sort;
        }
        if let Some(reverse) = file.directory_reverse {
            self.directory_reverse = reverse;
        }
        if let Some(titles) = file.directory_titles {
            self.directory_titles = titles;
        }
        self.temp_redirects.merge(file.temp_redirects);
        self.perm_redirects.merge(file.perm_redirects);
        self.mime_overrides.merge(file.mime_overrides);
        self.certificate_zones.merge(file.certificate_zones);
    }
}

/// Sort key for generated directory listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[serde(alias = "Name")]
    Name,
    #[serde(alias = "Size")]
    Size,
    #[serde(alias = "Time")]
    Time,
}

/// Connection and gateway limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Time allowed for the client to send its request line.
    pub request_timeout_secs: u64,

    /// Time allowed for the TLS handshake.
    pub handshake_timeout_secs: u64,

    /// Wall-clock limit for a CGI process.
    pub cgi_timeout_secs: u64,

    /// Cap on concurrent CGI/SCGI invocations. Unbounded when unset.
    pub max_gateway_processes: Option<usize>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            request_timeout_secs: 30,
            handshake_timeout_secs: 10,
            cgi_timeout_secs: 10,
            max_gateway_processes: None,
        }
    }
}

/// Contents of a per-directory override file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OverrideFile {
    pub gemini_ext: Option<String>,
    pub default_lang: Option<String>,
    pub directory_sort: Option<SortKey>,
    pub directory_reverse: Option<bool>,
    pub directory_titles: Option<bool>,
    pub temp_redirects: RuleMap<String>,
    pub perm_redirects: RuleMap<String>,
    pub mime_overrides: RuleMap<String>,
    pub certificate_zones: RuleMap<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let config: ServerConfig = toml::from_str("hostname = \"example.org\"").unwrap();
        assert_eq!(config.hostname, "example.org");
        assert_eq!(config.port, 1965);
        assert_eq!(config.gemini_ext, "gmi");
        assert_eq!(config.directory_sort, SortKey::Name);
        assert_eq!(config.limits.cgi_timeout_secs, 10);
        assert!(config.limits.max_gateway_processes.is_none());
    }

    #[test]
    fn sort_key_accepts_capitalised_names() {
        let config: ServerConfig = toml::from_str("directory_sort = \"Time\"").unwrap();
        assert_eq!(config.directory_sort, SortKey::Time);
        let config: ServerConfig = toml::from_str("directory_sort = \"size\"").unwrap();
        assert_eq!(config.directory_sort, SortKey::Size);
        assert!(toml::from_str::<ServerConfig>("directory_sort = \"colour\"").is_err());
    }

    #[test]
    fn override_replaces_scalars_and_merges_tables() {
        let mut config: ServerConfig = toml::from_str(
            r#"
            default_lang = "en"
            [temp_redirects]
            "^/old" = "/new"
            "^/keep" = "/kept"
            "#,
        )
        .unwrap();
        let file: OverrideFile = toml::from_str(
            r#"
            directory_reverse = true
            [temp_redirects]
            "^/old" = "/newer"
            "#,
        )
        .unwrap();

        config.apply_override(file);

        assert_eq!(config.default_lang, "en");
        assert!(config.directory_reverse);
        assert_eq!(config.temp_redirects.get("^/old").map(String::as_str), Some("/newer"));
        assert_eq!(config.temp_redirects.get("^/keep").map(String::as_str), Some("/kept"));
    }
}
