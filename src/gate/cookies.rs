//! Inbound cookie set and the cookie updates the provider hands back.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use std::fmt;

/// Cookies sent by the caller, in the order they appeared.
///
/// Values are kept as raw bytes so cookies carrying obs-text reach the origin
/// untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CookieJar {
    entries: Vec<(String, Vec<u8>)>,
}

impl CookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every `Cookie` header. HTTP/2 clients may split cookies across
    /// several header lines.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut jar = Self::new();
        for value in headers.get_all(COOKIE) {
            jar.extend_from_header(value.as_bytes());
        }
        jar
    }

    /// Parse a single `Cookie` header value.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let mut jar = Self::new();
        jar.extend_from_header(value.as_bytes());
        jar
    }

    // The browser sends the most specific cookie first, so a repeated name
    // keeps its first value. Pairs without `=` or with a non-UTF-8 name are
    // skipped on their own.
    fn extend_from_header(&mut self, value: &[u8]) {
        for pair in value.split(|&byte| byte == b';') {
            let Some(eq) = pair.iter().position(|&byte| byte == b'=') else {
                continue;
            };
            let Ok(name) = std::str::from_utf8(&pair[..eq]) else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() || self.contains(name) {
                continue;
            }
            self.entries
                .push((name.to_string(), pair[eq + 1..].trim_ascii().to_vec()));
        }
    }

    /// Value of `name`, if present and valid UTF-8.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| std::str::from_utf8(value).ok())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(key, _)| key == name)
    }

    /// Insert or replace a cookie, keeping the original position on replace.
    pub fn set(&mut self, name: &str, value: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|(key, _)| key == name) {
            entry.1 = value.as_bytes().to_vec();
        } else {
            self.entries
                .push((name.to_string(), value.as_bytes().to_vec()));
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(key, _)| key != name);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply provider updates: expired cookies are dropped, the rest set.
    pub fn merge(&mut self, updates: &[CookieUpdate]) {
        for update in updates {
            if update.is_removal() {
                self.remove(&update.name);
            } else {
                self.set(&update.name, &update.value);
            }
        }
    }

    #[must_use]
    pub fn merged(&self, updates: &[CookieUpdate]) -> Self {
        let mut jar = self.clone();
        jar.merge(updates);
        jar
    }

    /// The jar as a `Cookie` header value, byte for byte.
    #[must_use]
    pub fn to_header_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for (index, (name, value)) in self.entries.iter().enumerate() {
            if index > 0 {
                bytes.extend_from_slice(b"; ");
            }
            bytes.extend_from_slice(name.as_bytes());
            bytes.push(b'=');
            bytes.extend_from_slice(value);
        }
        bytes
    }

    /// Replace the `Cookie` header(s) in `headers` with this jar.
    ///
    /// # Errors
    /// Returns an error if a cookie value cannot be carried in a header.
    pub fn write_request_header(
        &self,
        headers: &mut HeaderMap,
    ) -> Result<(), InvalidHeaderValue> {
        headers.remove(COOKIE);
        if self.is_empty() {
            return Ok(());
        }
        headers.insert(COOKIE, HeaderValue::from_bytes(&self.to_header_bytes())?);
        Ok(())
    }
}

impl fmt::Display for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_header_bytes()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: Option<String>,
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

impl CookieOptions {
    /// `Path=/; HttpOnly; SameSite=Lax`, the attributes used for session cookies.
    #[must_use]
    pub fn session(secure: bool) -> Self {
        Self {
            path: Some("/".to_string()),
            max_age: None,
            http_only: true,
            secure,
            same_site: Some(SameSite::Lax),
        }
    }

    #[must_use]
    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self::session(false)
    }
}

/// A `(name, value, options)` triple to be sent back as `Set-Cookie`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieUpdate {
    pub name: String,
    pub value: String,
    pub options: CookieOptions,
}

impl CookieUpdate {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>, options: CookieOptions) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            options,
        }
    }

    /// An update that tells the browser to drop `name`.
    #[must_use]
    pub fn expire(name: impl Into<String>, options: CookieOptions) -> Self {
        Self::new(name, "", options.with_max_age(0))
    }

    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.options.max_age.is_some_and(|age| age <= 0)
    }

    /// Render as a `Set-Cookie` header value.
    ///
    /// # Errors
    /// Returns an error if the rendered cookie contains invalid header bytes.
    pub fn to_header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::from_str(&self.to_string())
    }
}

impl fmt::Display for CookieUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(path) = &self.options.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(max_age) = self.options.max_age {
            write!(f, "; Max-Age={}", max_age.max(0))?;
        }
        if self.options.http_only {
            f.write_str("; HttpOnly")?;
        }
        if let Some(same_site) = self.options.same_site {
            write!(f, "; SameSite={}", same_site.as_str())?;
        }
        if self.options.secure {
            f.write_str("; Secure")?;
        }
        Ok(())
    }
}

/// Append one `Set-Cookie` header per update.
///
/// # Errors
/// Returns an error if any update cannot be rendered as a header value.
pub fn append_set_cookies(
    headers: &mut HeaderMap,
    updates: &[CookieUpdate],
) -> Result<(), InvalidHeaderValue> {
    for update in updates {
        headers.append(SET_COOKIE, update.to_header_value()?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cookie_header() {
        let jar = CookieJar::parse("atal-access-token=abc; theme=dark ;  lang=en");
        assert_eq!(jar.len(), 3);
        assert_eq!(jar.get("atal-access-token"), Some("abc"));
        assert_eq!(jar.get("theme"), Some("dark"));
        assert_eq!(jar.get("lang"), Some("en"));
        assert_eq!(jar.get("missing"), None);
    }

    #[test]
    fn parse_skips_malformed_pairs() {
        let jar = CookieJar::parse("novalue; =orphan; ok=1; token=a=b");
        assert_eq!(jar.len(), 2);
        assert_eq!(jar.get("ok"), Some("1"));
        // Only the first '=' separates name and value.
        assert_eq!(jar.get("token"), Some("a=b"));
    }

    #[test]
    fn from_headers_reads_every_cookie_line() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("a=1"));
        headers.append(COOKIE, HeaderValue::from_static("b=2; a=3"));
        let jar = CookieJar::from_headers(&headers);
        assert_eq!(jar.len(), 2);
        assert_eq!(jar.get("a"), Some("1"));
        assert_eq!(jar.get("b"), Some("2"));
    }

    #[test]
    fn repeated_name_keeps_first_value() {
        let jar = CookieJar::parse("atal-access-token=scoped; theme=dark; atal-access-token=root");
        assert_eq!(jar.get("atal-access-token"), Some("scoped"));
        assert_eq!(jar.to_string(), "atal-access-token=scoped; theme=dark");
    }

    #[test]
    fn non_ascii_cookie_does_not_hide_the_session() {
        let mut headers = HeaderMap::new();
        headers.append(
            COOKIE,
            HeaderValue::from_bytes(b"atal-access-token=good; name=Jos\xe9; city=S\xc3\xa3o")
                .expect("obs-text is a valid header value"),
        );
        let jar = CookieJar::from_headers(&headers);
        assert_eq!(jar.len(), 3);
        assert_eq!(jar.get("atal-access-token"), Some("good"));
        assert_eq!(jar.get("name"), None);
        assert!(jar.contains("name"));
        assert_eq!(jar.get("city"), Some("S\u{e3}o"));

        let mut forwarded = HeaderMap::new();
        assert!(jar.write_request_header(&mut forwarded).is_ok());
        assert_eq!(
            forwarded.get(COOKIE).map(HeaderValue::as_bytes),
            Some(&b"atal-access-token=good; name=Jos\xe9; city=S\xc3\xa3o"[..])
        );
    }

    #[test]
    fn missing_header_is_empty_jar() {
        let jar = CookieJar::from_headers(&HeaderMap::new());
        assert!(jar.is_empty());
        assert_eq!(jar.to_string(), "");
    }

    #[test]
    fn merge_sets_replaces_and_removes() {
        let jar = CookieJar::parse("theme=dark; atal-access-token=old; atal-refresh-token=r1");
        let options = CookieOptions::session(false);
        let merged = jar.merged(&[
            CookieUpdate::new("atal-access-token", "new", options.clone().with_max_age(3600)),
            CookieUpdate::expire("atal-refresh-token", options.clone()),
            CookieUpdate::new("lang", "fr", options),
        ]);
        assert_eq!(merged.to_string(), "theme=dark; atal-access-token=new; lang=fr");
        // Original jar untouched.
        assert_eq!(jar.get("atal-access-token"), Some("old"));
    }

    #[test]
    fn merge_with_no_updates_is_identity() {
        let jar = CookieJar::parse("a=1; b=2");
        assert_eq!(jar.merged(&[]), jar);
    }

    #[test]
    fn write_request_header_replaces_cookie_lines() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("a=1"));
        headers.append(COOKIE, HeaderValue::from_static("b=2"));
        let jar = CookieJar::parse("a=9; b=2");
        assert!(jar.write_request_header(&mut headers).is_ok());
        let values: Vec<_> = headers.get_all(COOKIE).iter().collect();
        assert_eq!(values, vec![&HeaderValue::from_static("a=9; b=2")]);

        assert!(CookieJar::new().write_request_header(&mut headers).is_ok());
        assert!(headers.get(COOKIE).is_none());
    }

    #[test]
    fn render_session_cookie() {
        let update = CookieUpdate::new(
            "atal-access-token",
            "tok",
            CookieOptions::session(true).with_max_age(3600),
        );
        assert_eq!(
            update.to_string(),
            "atal-access-token=tok; Path=/; Max-Age=3600; HttpOnly; SameSite=Lax; Secure"
        );
        assert!(!update.is_removal());
    }

    #[test]
    fn render_expired_cookie() {
        let update = CookieUpdate::expire("atal-refresh-token", CookieOptions::session(false));
        assert!(update.is_removal());
        assert_eq!(
            update.to_string(),
            "atal-refresh-token=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax"
        );
    }

    #[test]
    fn append_set_cookies_keeps_each_update() {
        let mut headers = HeaderMap::new();
        let options = CookieOptions::session(false);
        let updates = [
            CookieUpdate::new("a", "1", options.clone()),
            CookieUpdate::new("b", "2", options),
        ];
        assert!(append_set_cookies(&mut headers, &updates).is_ok());
        assert_eq!(headers.get_all(SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn invalid_cookie_value_is_rejected() {
        let update = CookieUpdate::new("a", "line\nbreak", CookieOptions::default());
        assert!(update.to_header_value().is_err());
    }
}
