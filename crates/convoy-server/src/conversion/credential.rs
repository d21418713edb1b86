//! Remote API credential

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ConversionConfig;

type Provider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Credential for the remote service: a fixed value or a provider consulted
/// on every dispatch
#[derive(Clone, Default)]
pub enum Credential {
    #[default]
    None,
    Static(String),
    Provider(Provider),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::None => f.write_str("Credential::None"),
            Credential::Static(_) => f.write_str("Credential::Static(<redacted>)"),
            Credential::Provider(_) => f.write_str("Credential::Provider(..)"),
        }
    }
}

impl Credential {
    pub fn provider<F>(f: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        Credential::Provider(Arc::new(f))
    }

    /// Provider re-reading `path` each time, so rotated keys apply without a restart
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::provider(move || match std::fs::read_to_string(&path) {
            Ok(contents) => Some(contents),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read API key file");
                None
            }
        })
    }

    /// Key file wins over a static key
    pub fn from_config(config: &ConversionConfig) -> Self {
        if let Some(path) = &config.api_key_file {
            Self::from_file(path.clone())
        } else if let Some(key) = &config.api_key {
            Credential::Static(key.clone())
        } else {
            Credential::None
        }
    }

    /// Current value, trimmed; blank counts as missing
    pub fn resolve(&self) -> Option<String> {
        let raw = match self {
            Credential::None => None,
            Credential::Static(key) => Some(key.clone()),
            Credential::Provider(provider) => provider(),
        }?;
        let key = raw.trim();
        (!key.is_empty()).then(|| key.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    #[test]
    fn test_static_and_blank() {
        assert_eq!(Credential::Static(" key ".into()).resolve().as_deref(), Some("key"));
        assert_eq!(Credential::Static("   ".into()).resolve(), None);
        assert_eq!(Credential::None.resolve(), None);
    }

    #[test]
    fn test_file_provider_is_reread() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key");
        let credential = Credential::from_file(&path);

        assert_eq!(credential.resolve(), None);

        std::fs::write(&path, "first\n").unwrap();
        assert_eq!(credential.resolve().as_deref(), Some("first"));

        std::fs::write(&path, "second\n").unwrap();
        assert_eq!(credential.resolve().as_deref(), Some("second"));
    }

    #[test]
    fn test_from_config_prefers_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, "from-file").unwrap();

        let mut conversion = Config::default().conversion;
        conversion.api_key = Some("static".to_string());
        assert_eq!(Credential::from_config(&conversion).resolve().as_deref(), Some("static"));

        conversion.api_key_file = Some(path);
        assert_eq!(Credential::from_config(&conversion).resolve().as_deref(), Some("from-file"));
    }

    #[test]
    fn test_debug_redacts() {
        let rendered = format!("{:?}", Credential::Static("secret".into()));
        assert!(!rendered.contains("secret"));
    }
}
