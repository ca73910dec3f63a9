//! Path classification for the request gate.

/// Gating category of a request path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteClass {
    /// Requires a session.
    Protected,
    /// Only meaningful without a session (login, verification).
    AuthOnly,
    /// Everything else.
    Public,
}

/// The two prefix lists that drive classification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteTable {
    protected_prefixes: Vec<String>,
    auth_prefixes: Vec<String>,
}

impl RouteTable {
    #[must_use]
    pub fn new(protected_prefixes: Vec<String>, auth_prefixes: Vec<String>) -> Self {
        Self {
            protected_prefixes,
            auth_prefixes,
        }
    }

    #[must_use]
    pub fn protected_prefixes(&self) -> &[String] {
        &self.protected_prefixes
    }

    #[must_use]
    pub fn auth_prefixes(&self) -> &[String] {
        &self.auth_prefixes
    }

    /// Classify `path`. Protected prefixes win over auth prefixes when both match.
    #[must_use]
    pub fn classify(&self, path: &str) -> RouteClass {
        classify(path, &self.protected_prefixes, &self.auth_prefixes)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(
            vec!["/app".to_string()],
            vec!["/login".to_string(), "/verify".to_string()],
        )
    }
}

/// Pure prefix match of `path` against the protected and auth-flow lists.
#[must_use]
pub fn classify<S: AsRef<str>>(path: &str, protected: &[S], auth: &[S]) -> RouteClass {
    if protected.iter().any(|prefix| path.starts_with(prefix.as_ref())) {
        RouteClass::Protected
    } else if auth.iter().any(|prefix| path.starts_with(prefix.as_ref())) {
        RouteClass::AuthOnly
    } else {
        RouteClass::Public
    }
}

/// Canonical form of a request path, the one that gets classified and relayed.
///
/// Percent-encoded unreserved characters are decoded, `\` is read as `/`,
/// repeated slashes collapse and dot segments are resolved. The result always
/// starts with `/`.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let decoded = decode_unreserved(path);

    let mut segments: Vec<&str> = Vec::new();
    let mut trailing_slash = false;
    for segment in decoded.split(|c: char| c == '/' || c == '\\') {
        trailing_slash = matches!(segment, "" | "." | "..");
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    let mut normalized = String::with_capacity(decoded.len());
    for segment in &segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if segments.is_empty() || trailing_slash {
        normalized.push('/');
    }
    normalized
}

fn decode_unreserved(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' && index + 2 < bytes.len() {
            let byte = hex_value(bytes[index + 1])
                .zip(hex_value(bytes[index + 2]))
                .map(|(high, low)| (high << 4) | low)
                .filter(|&b| is_unreserved(b));
            if let Some(byte) = byte {
                decoded.push(byte);
                index += 3;
                continue;
            }
        }
        decoded.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

// RFC 3986 unreserved: ALPHA / DIGIT / "-" / "." / "_" / "~"
const fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
