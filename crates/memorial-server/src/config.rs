//! Server Configuration

/// Process-level settings read from the environment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    /// Listen address
    pub bind_addr: String,

    /// Public site root used for payment redirects
    pub site_url: String,

    /// Directory holding the presentation layer
    pub static_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            site_url: "http://localhost:3000".into(),
            static_dir: "static".into(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read `BIND_ADDR`, `SITE_URL` and `STATIC_DIR`, falling back to
    /// defaults for anything unset or empty
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str, default: String| {
            lookup(key).filter(|v| !v.is_empty()).unwrap_or(default)
        };

        Self {
            bind_addr: var("BIND_ADDR", defaults.bind_addr),
            site_url: var("SITE_URL", defaults.site_url)
                .trim_end_matches('/')
                .to_string(),
            static_dir: var("STATIC_DIR", defaults.static_dir),
        }
    }
}
