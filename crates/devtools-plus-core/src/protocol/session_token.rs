//! `sessionId` token rewriting.
//!
//! Child-session ids issued by a Node.js inspector embed the inspector's port,
//! e.g. `"1A2B:9229:3"`.  A front-end that talks to the bridge on port 8229
//! must see `"1A2B:8229:3"` instead, and the backend must get its own token
//! back when the front-end replies.
//!
//! Rewriting is purely textual and touches only the *value* of `"sessionId"`
//! string fields.  Everything else in the frame (field order, whitespace,
//! escapes, numbers) is copied byte for byte, so a message that travels
//! front-end → backend → front-end comes back identical.

use std::borrow::Cow;

/// The quoted key whose string value is rewritten.
const SESSION_ID_KEY: &str = "\"sessionId\"";

/// The pair of substrings swapped inside `sessionId` values.
///
/// `public` is what the front-end sees; `private` is what the backend issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    public: String,
    private: String,
}

impl SessionTokens {
    pub fn new(public: impl Into<String>, private: impl Into<String>) -> Self {
        Self {
            public: public.into(),
            private: private.into(),
        }
    }

    /// Tokens of the form `":{port}:"` for the bridge and backend ports.
    ///
    /// ```rust
    /// use devtools_plus_core::protocol::SessionTokens;
    ///
    /// let tokens = SessionTokens::for_ports(8229, 9229);
    /// let raw = r#"{"id":1,"method":"Runtime.enable","sessionId":"A:8229:B"}"#;
    /// assert_eq!(
    ///     tokens.to_backend(raw),
    ///     r#"{"id":1,"method":"Runtime.enable","sessionId":"A:9229:B"}"#
    /// );
    /// ```
    pub fn for_ports(bridge_port: u16, backend_port: u16) -> Self {
        Self::new(format!(":{bridge_port}:"), format!(":{backend_port}:"))
    }

    pub fn public(&self) -> &str {
        &self.public
    }

    pub fn private(&self) -> &str {
        &self.private
    }

    /// Rewrites a front-end frame for the backend (public → private).
    pub fn to_backend<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        rewrite_session_ids(raw, &self.public, &self.private)
    }

    /// Rewrites a backend frame for the front-end (private → public).
    pub fn to_frontend<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        rewrite_session_ids(raw, &self.private, &self.public)
    }
}

/// Replaces `from` with `to` inside every `"sessionId": "<value>"` string value
/// of `raw`.
///
/// Returns [`Cow::Borrowed`] when nothing changed, so the common case (no
/// child sessions) allocates nothing.
///
/// The scan works on bytes.  Every delimiter it looks for (`"`, `:`, `\`,
/// ASCII whitespace) is a single-byte character, and UTF-8 continuation bytes
/// never collide with ASCII, so every slice boundary is a valid `char` boundary.
pub fn rewrite_session_ids<'a>(raw: &'a str, from: &str, to: &str) -> Cow<'a, str> {
    if from.is_empty() || from == to || !raw.contains(from) {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut cursor = 0;
    let mut changed = false;

    while let Some(offset) = raw[cursor..].find(SESSION_ID_KEY) {
        let key_start = cursor + offset;
        let after_key = key_start + SESSION_ID_KEY.len();

        // `\"sessionId\"` inside some other string value is not a key.
        let escaped = key_start > 0 && raw.as_bytes()[key_start - 1] == b'\\';
        let span = if escaped {
            None
        } else {
            string_value_span(raw, after_key)
        };

        let Some((value_start, value_end)) = span else {
            out.push_str(&raw[cursor..after_key]);
            cursor = after_key;
            continue;
        };

        out.push_str(&raw[cursor..value_start]);
        let value = &raw[value_start..value_end];
        if value.contains(from) {
            out.push_str(&value.replace(from, to));
            changed = true;
        } else {
            out.push_str(value);
        }
        cursor = value_end;
    }

    if !changed {
        return Cow::Borrowed(raw);
    }
    out.push_str(&raw[cursor..]);
    Cow::Owned(out)
}

/// Given the index just past a quoted key, returns the byte span of the string
/// value that follows `:` (excluding the quotes), or `None` if the value is not
/// a string.
fn string_value_span(raw: &str, mut pos: usize) -> Option<(usize, usize)> {
    let bytes = raw.as_bytes();
    let skip_ws = |mut p: usize| {
        while p < bytes.len() && bytes[p].is_ascii_whitespace() {
            p += 1;
        }
        p
    };

    pos = skip_ws(pos);
    if bytes.get(pos) != Some(&b':') {
        return None;
    }
    pos = skip_ws(pos + 1);
    if bytes.get(pos) != Some(&b'"') {
        return None;
    }

    let start = pos + 1;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some((start, i)),
            _ => i += 1,
        }
    }
    None
}
