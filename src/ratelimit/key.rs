//! Rate limit key generation.

use std::fmt;

/// Separator between the API and caller components.
pub const KEY_SEPARATOR: char = ':';

/// A key that uniquely identifies one (api, caller) admission stream.
///
/// The key is `api:caller`. Separators and backslashes inside the API
/// component are backslash-escaped, so the first unescaped `:` always marks
/// the boundary and two different pairs can never produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// Create a key from an API identifier and a caller identifier.
    pub fn new(api: &str, caller: &str) -> Self {
        let mut key = String::with_capacity(api.len() + caller.len() + 1);
        for c in api.chars() {
            if c == KEY_SEPARATOR || c == '\\' {
                key.push('\\');
            }
            key.push(c);
        }
        key.push(KEY_SEPARATOR);
        key.push_str(caller);
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RateLimitKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let key = RateLimitKey::new("orders", "10.0.0.1");
        assert_eq!(key.as_str(), "orders:10.0.0.1");
        assert_eq!(key.to_string(), "orders:10.0.0.1");
    }

    #[test]
    fn test_key_equality() {
        assert_eq!(
            RateLimitKey::new("apiA", "user1"),
            RateLimitKey::new("apiA", "user1")
        );
        assert_ne!(
            RateLimitKey::new("apiA", "user1"),
            RateLimitKey::new("apiA", "user2")
        );
        assert_ne!(
            RateLimitKey::new("apiA", "user1"),
            RateLimitKey::new("apiB", "user1")
        );
    }

    #[test]
    fn test_separator_in_components_does_not_collide() {
        let a = RateLimitKey::new("a:b", "c");
        let b = RateLimitKey::new("a", "b:c");
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "a\\:b:c");
        assert_eq!(b.as_str(), "a:b:c");
    }

    #[test]
    fn test_backslash_in_components_does_not_collide() {
        let a = RateLimitKey::new("a\\", "b");
        let b = RateLimitKey::new("a", "\\b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_ipv6_caller() {
        let key = RateLimitKey::new("search", "::1");
        assert_eq!(key.as_str(), "search:::1");
    }
}
