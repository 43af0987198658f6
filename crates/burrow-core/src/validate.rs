use crate::error::{Result, StorageError};
use url::Url;

/// Validates that every URL is absolute and has a host.
///
/// Fails on the first malformed URL so that a batch is rejected as a whole.
pub fn validate_urls(urls: &[String]) -> Result<()> {
    urls.iter().try_for_each(|url| validate_url(url))
}

fn validate_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(StorageError::InvalidInput("URL cannot be empty".to_string()));
    }

    // `Url::parse` silently strips tabs and newlines.
    if url.chars().any(char::is_control) {
        return Err(StorageError::InvalidInput(format!(
            "URL contains control characters: {url:?}"
        )));
    }

    let parsed = Url::parse(url)
        .map_err(|e| StorageError::InvalidInput(format!("{url}: {e}")))?;

    if !parsed.has_host() {
        return Err(StorageError::InvalidInput(format!(
            "URL must have a valid scheme and host: {url}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn accepts_absolute_urls() {
        let good = urls(&["https://yandex.ru", "http://a.b/c?d=e"]);
        assert!(validate_urls(&good).is_ok());
        assert!(validate_urls(&[]).is_ok());
    }

    #[test]
    fn rejects_missing_scheme_or_host() {
        for bad in ["", "not-a-valid-url", "/relative/path", "mailto:someone@example.com"] {
            let err = validate_urls(&urls(&[bad])).unwrap_err();
            assert!(matches!(err, StorageError::InvalidInput(_)), "{bad}");
        }
    }

    #[test]
    fn rejects_control_characters() {
        for bad in [
            "https://a.b/x\ny",
            "https://a.b/\tpath",
            "https://a.b/\r",
            "https://a.b/\u{7f}",
        ] {
            let err = validate_urls(&urls(&[bad])).unwrap_err();
            assert!(matches!(err, StorageError::InvalidInput(_)), "{bad:?}");
        }
    }

    #[test]
    fn one_bad_url_rejects_batch() {
        let err = validate_urls(&urls(&["https://ok.example", "nope"])).unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }
}
