//! Subdomain label utilities
//!
//! A label is the DNS-safe identifier that selects a tunnel in the registry:
//! lowercase ASCII `[a-z0-9-]`, 1 to 63 bytes, no leading or trailing dash,
//! no consecutive dashes, no dots.

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use crate::constants::MAX_LABEL_LEN;

/// Label grammar: alphanumeric runs separated by single dashes
static LABEL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("valid label regex"));

static ADJECTIVES: [&str; 12] = [
    "brave", "calm", "clever", "eager", "fuzzy", "gentle", "happy", "lucky", "mellow", "quiet",
    "swift", "witty",
];

static NOUNS: [&str; 12] = [
    "falcon", "harbor", "lantern", "maple", "meadow", "otter", "pebble", "raven", "river",
    "spruce", "tiger", "willow",
];

/// Extract the subdomain label from a Host header value.
///
/// Strips any `:port` suffix, then requires `host` to be exactly one label
/// under `root_domain`. Nested subdomains and the bare root are rejected.
pub fn extract<'a>(host: &'a str, root_domain: &str) -> Option<&'a str> {
    let host = host.split(':').next().unwrap_or(host);
    let prefix = host.strip_suffix(root_domain)?.strip_suffix('.')?;
    if prefix.is_empty() || prefix.contains('.') {
        return None;
    }
    Some(prefix)
}

/// Normalize arbitrary input into a label.
///
/// Lowercases, maps every run of characters outside `[a-z0-9]` to a single
/// dash, trims dashes at both ends, and truncates to 63 bytes. Idempotent:
/// `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(input: &str) -> String {
    let mut label = String::with_capacity(input.len().min(MAX_LABEL_LEN));
    let mut pending_dash = false;
    for c in input.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !label.is_empty() {
                label.push('-');
            }
            pending_dash = false;
            label.push(c);
        } else {
            pending_dash = true;
        }
    }
    label.truncate(MAX_LABEL_LEN);
    // Truncation can expose a trailing dash
    while label.ends_with('-') {
        label.pop();
    }
    label
}

/// Generate a random human-readable label: `adjective-noun-xxxx`.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
    let suffix: u16 = rng.gen();
    format!("{}-{}-{:04x}", adjective, noun, suffix)
}

/// Check a string against the label grammar.
pub fn is_valid_label(label: &str) -> bool {
    label.len() <= MAX_LABEL_LEN && LABEL_REGEX.is_match(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_single_label() {
        assert_eq!(extract("sub.root", "root"), Some("sub"));
        assert_eq!(
            extract("my-app.tunnel.example.com", "tunnel.example.com"),
            Some("my-app")
        );
    }

    #[test]
    fn test_extract_bare_root() {
        assert_eq!(extract("root", "root"), None);
        assert_eq!(extract("tunnel.example.com", "tunnel.example.com"), None);
    }

    #[test]
    fn test_extract_nested_subdomain() {
        assert_eq!(extract("a.b.root", "root"), None);
    }

    #[test]
    fn test_extract_strips_port() {
        assert_eq!(extract("sub.root:443", "root"), Some("sub"));
        assert_eq!(extract("root:8080", "root"), None);
    }

    #[test]
    fn test_extract_unrelated_host() {
        assert_eq!(extract("example.org", "root"), None);
        assert_eq!(extract("notroot", "root"), None);
        // Suffix must be a whole label boundary
        assert_eq!(extract("xroot", "root"), None);
    }

    #[test]
    fn test_sanitize_basic() {
        assert_eq!(sanitize("Hello World!!"), "hello-world");
        assert_eq!(sanitize("--foo__bar--"), "foo-bar");
        assert_eq!(sanitize("my-app"), "my-app");
        assert_eq!(sanitize("My App 2"), "my-app-2");
    }

    #[test]
    fn test_sanitize_collapses_runs() {
        assert_eq!(sanitize("a---b"), "a-b");
        assert_eq!(sanitize("a . , b"), "a-b");
    }

    #[test]
    fn test_sanitize_empty_results() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("!!!"), "");
        assert_eq!(sanitize("---"), "");
    }

    #[test]
    fn test_sanitize_truncates_to_63_bytes() {
        let long = "a".repeat(100);
        let label = sanitize(&long);
        assert_eq!(label.len(), 63);

        // A dash exposed by truncation is trimmed
        let mut input = "a".repeat(63);
        input.push_str("-bbbb");
        let label = sanitize(&input);
        assert_eq!(label, "a".repeat(63));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            "Hello World!!",
            "--foo__bar--",
            "ALL CAPS",
            "dots.and.dashes-",
            &"x".repeat(200),
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_generate_satisfies_grammar() {
        for _ in 0..100 {
            let label = generate();
            assert!(is_valid_label(&label), "invalid label: {}", label);
            let parts: Vec<&str> = label.split('-').collect();
            assert_eq!(parts.len(), 3);
            assert!(ADJECTIVES.contains(&parts[0]));
            assert!(NOUNS.contains(&parts[1]));
            assert_eq!(parts[2].len(), 4);
        }
    }

    #[test]
    fn test_is_valid_label() {
        assert!(is_valid_label("a"));
        assert!(is_valid_label("my-app-2"));
        assert!(is_valid_label(&"a".repeat(63)));

        assert!(!is_valid_label(""));
        assert!(!is_valid_label("-leading"));
        assert!(!is_valid_label("trailing-"));
        assert!(!is_valid_label("double--dash"));
        assert!(!is_valid_label("UPPER"));
        assert!(!is_valid_label("with.dot"));
        assert!(!is_valid_label(&"a".repeat(64)));
    }
}
