//! DOS wildcard patterns.
//!
//! A pattern like `*.TXT` or `A?.*` is expanded into FCB-style 8+3 masks,
//! space padded, where `?` matches any character (including padding).

/// A wildcard compiled into name and extension masks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern {
    name: [u8; 8],
    ext: [u8; 3],
}

/// Copy `text` into a space padded field, expanding `*` to `?` for the rest.
fn fill(field: &mut [u8], text: &str) {
    for (i, b) in text.bytes().enumerate() {
        if b == b'*' {
            let start = i.min(field.len());
            field[start..].fill(b'?');
            return;
        }
        if i >= field.len() {
            return;
        }
        field[i] = b.to_ascii_uppercase();
    }
}

/// Split a short name into space padded FCB fields.
fn fcb_fields(short: &str) -> ([u8; 8], [u8; 3]) {
    let mut name = [b' '; 8];
    let mut ext = [b' '; 3];
    let (base, extension) = match short {
        "." | ".." => (short, ""),
        _ => short.split_once('.').unwrap_or((short, "")),
    };
    for (dst, b) in name.iter_mut().zip(base.bytes()) {
        *dst = b.to_ascii_uppercase();
    }
    for (dst, b) in ext.iter_mut().zip(extension.bytes()) {
        *dst = b.to_ascii_uppercase();
    }
    (name, ext)
}

impl WildcardPattern {
    pub fn parse(pattern: &str) -> Self {
        let mut name = [b' '; 8];
        let mut ext = [b' '; 3];
        let (base, extension) = match pattern {
            "." | ".." => (pattern, ""),
            _ => pattern.split_once('.').unwrap_or((pattern, "")),
        };
        fill(&mut name, base);
        fill(&mut ext, extension);
        Self { name, ext }
    }

    /// Pattern matching every name.
    pub fn all() -> Self {
        Self::parse("*.*")
    }

    /// True if `text` contains `*` or `?`.
    pub fn is_wildcard(text: &str) -> bool {
        text.contains(['*', '?'])
    }

    pub fn matches(&self, short_name: &str) -> bool {
        let (name, ext) = fcb_fields(short_name);
        let field = |pattern: &[u8], actual: &[u8]| {
            pattern
                .iter()
                .zip(actual)
                .all(|(&p, &a)| p == b'?' || p == a)
        };
        field(&self.name, &name) && field(&self.ext, &ext)
    }
}
