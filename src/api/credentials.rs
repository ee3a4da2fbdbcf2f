//! Session cookie sources.
//!
//! How a cookie is obtained (manual copy, browser export, automated login)
//! is outside this crate. A [`CredentialProvider`] just hands back the
//! cookie string; [`CookieCache`] makes sure it is asked at most once until
//! an explicit refresh.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Deserialize;

use crate::error::LiveError;

/// Supplies the session cookie. May block.
pub trait CredentialProvider: Send + Sync {
    /// Return the cookie string (`name=value; name2=value2`).
    ///
    /// # Errors
    ///
    /// [`LiveError::SessionInvalid`] when no usable cookie is available.
    fn cookie(&self) -> Result<String, LiveError>;
}

/// A cookie given up front.
#[derive(Clone)]
pub struct StaticCookie(String);

impl StaticCookie {
    /// Wrap `cookie`.
    pub fn new(cookie: impl Into<String>) -> Self {
        Self(cookie.into())
    }
}

impl std::fmt::Debug for StaticCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticCookie(<redacted>)")
    }
}

impl CredentialProvider for StaticCookie {
    fn cookie(&self) -> Result<String, LiveError> {
        let cookie = self.0.trim();
        if cookie.is_empty() {
            return Err(LiveError::SessionInvalid("no cookie configured".to_string()));
        }
        Ok(cookie.to_string())
    }
}

/// Browser cookie export entry.
#[derive(Deserialize)]
struct ExportedCookie {
    name: String,
    value: String,
}

/// A cookie read from a file.
///
/// The file holds either a raw cookie header or a JSON array of
/// `{"name": ..., "value": ...}` objects as exported by browsers.
#[derive(Debug, Clone)]
pub struct FileCookie {
    path: PathBuf,
}

impl FileCookie {
    /// Read from `path` on every call.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File this provider reads.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialProvider for FileCookie {
    fn cookie(&self) -> Result<String, LiveError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            LiveError::SessionInvalid(format!("cannot read {}: {e}", self.path.display()))
        })?;
        parse_cookie_file(&contents)
    }
}

fn parse_cookie_file(contents: &str) -> Result<String, LiveError> {
    let trimmed = contents.trim();
    let cookie = if trimmed.starts_with('[') {
        let entries: Vec<ExportedCookie> = serde_json::from_str(trimmed)
            .map_err(|e| LiveError::SessionInvalid(format!("invalid cookie export: {e}")))?;
        entries
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    } else {
        trimmed.to_string()
    };
    if cookie.is_empty() {
        return Err(LiveError::SessionInvalid("cookie file is empty".to_string()));
    }
    Ok(cookie)
}

/// Calls the wrapped provider at most once until [`refresh`](Self::refresh).
pub struct CookieCache<P> {
    provider: P,
    cached: Mutex<Option<String>>,
}

impl<P: std::fmt::Debug> std::fmt::Debug for CookieCache<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieCache")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl<P: CredentialProvider> CookieCache<P> {
    /// Cache in front of `provider`.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            cached: Mutex::new(None),
        }
    }

    /// Drop the cached cookie and fetch a fresh one.
    ///
    /// # Errors
    ///
    /// Whatever the provider returns.
    pub fn refresh(&self) -> Result<String, LiveError> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        *cached = None;
        let cookie = self.provider.cookie()?;
        *cached = Some(cookie.clone());
        Ok(cookie)
    }
}

impl<P: CredentialProvider> CredentialProvider for CookieCache<P> {
    fn cookie(&self) -> Result<String, LiveError> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cookie) = cached.as_ref() {
            return Ok(cookie.clone());
        }
        let cookie = self.provider.cookie()?;
        *cached = Some(cookie.clone());
        Ok(cookie)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl CredentialProvider for Counting {
        fn cookie(&self) -> Result<String, LiveError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!("session={n}"))
        }
    }

    #[test]
    fn test_static_cookie_rejects_blank() {
        assert!(matches!(
            StaticCookie::new("   ").cookie(),
            Err(LiveError::SessionInvalid(_))
        ));
        assert_eq!(StaticCookie::new(" a=b ").cookie().unwrap(), "a=b");
    }

    #[test]
    fn test_static_cookie_debug_is_redacted() {
        assert!(!format!("{:?}", StaticCookie::new("secret=1")).contains("secret"));
    }

    #[test]
    fn test_file_cookie_raw_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookie.txt");
        std::fs::write(&path, "did=abc; userId=42\n").unwrap();
        assert_eq!(FileCookie::new(&path).cookie().unwrap(), "did=abc; userId=42");
    }

    #[test]
    fn test_file_cookie_browser_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(
            &path,
            r#"[{"name":"did","value":"abc","domain":".example.com"},{"name":"userId","value":"42"}]"#,
        )
        .unwrap();
        assert_eq!(FileCookie::new(&path).cookie().unwrap(), "did=abc; userId=42");
    }

    #[test]
    fn test_file_cookie_missing_file() {
        let err = FileCookie::new("/nonexistent/kslive/cookie").cookie().unwrap_err();
        assert!(matches!(err, LiveError::SessionInvalid(_)));
    }

    #[test]
    fn test_cache_calls_provider_once_until_refresh() {
        let cache = CookieCache::new(Counting(AtomicUsize::new(0)));
        assert_eq!(cache.cookie().unwrap(), "session=0");
        assert_eq!(cache.cookie().unwrap(), "session=0");
        assert_eq!(cache.refresh().unwrap(), "session=1");
        assert_eq!(cache.cookie().unwrap(), "session=1");
    }
}
