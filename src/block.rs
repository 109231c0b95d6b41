//! WAF-block detection heuristics.
//!
//! A block is not reported through a dedicated API field; it shows up as a
//! rejection status code, a distinctive response body, or both. The marker
//! set is a heuristic, not a stable contract, so it is an explicit input the
//! caller can override rather than a hardcoded detector.

/// Signatures used to classify a response as a WAF block.
///
/// Matching is evidence-based: a response is a block when its status code is
/// in `statuses` or its body contains any of `markers` (case-insensitive).
/// The defaults cover common filtering appliances; override them with
/// [`BlockSignatures::new`] for a specific deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSignatures {
    /// HTTP status codes that indicate rejection.
    pub statuses: Vec<u16>,
    /// Case-insensitive body substrings that indicate rejection.
    pub markers: Vec<String>,
}

impl BlockSignatures {
    /// Creates a signature set from explicit statuses and markers.
    pub fn new(statuses: Vec<u16>, markers: Vec<String>) -> Self {
        Self { statuses, markers }
    }

    /// Classifies one response; returns evidence when it matches.
    pub fn classify(&self, status: u16, body: &str) -> Option<BlockEvidence> {
        if self.statuses.contains(&status) {
            let matched = self.find_marker(body);
            return Some(BlockEvidence::new(status, matched, body));
        }
        if let Some(marker) = self.find_marker(body) {
            return Some(BlockEvidence::new(status, Some(marker), body));
        }
        None
    }

    fn find_marker(&self, body: &str) -> Option<String> {
        let lowered = body.to_lowercase();
        self.markers
            .iter()
            .find(|marker| lowered.contains(&marker.to_lowercase()))
            .cloned()
    }
}

impl Default for BlockSignatures {
    fn default() -> Self {
        Self {
            statuses: vec![403, 406],
            markers: vec![
                "forbidden".to_string(),
                "access denied".to_string(),
                "request blocked".to_string(),
                "security policy".to_string(),
                "web application firewall".to_string(),
            ],
        }
    }
}

/// Evidence collected for one blocked message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockEvidence {
    /// The HTTP status of the rejected request.
    pub status: u16,
    /// The marker that matched, when classification came from the body.
    pub matched_marker: Option<String>,
    /// A bounded excerpt of the response body.
    pub excerpt: String,
}

/// How much of the body to retain as evidence.
const EXCERPT_LEN: usize = 200;

impl BlockEvidence {
    fn new(status: u16, matched_marker: Option<String>, body: &str) -> Self {
        let mut excerpt = body.to_string();
        if excerpt.len() > EXCERPT_LEN {
            let mut cut = EXCERPT_LEN;
            while !excerpt.is_char_boundary(cut) {
                cut -= 1;
            }
            excerpt.truncate(cut);
        }
        Self {
            status,
            matched_marker,
            excerpt,
        }
    }
}

impl std::fmt::Display for BlockEvidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.matched_marker {
            Some(marker) => write!(f, "HTTP {} (marker {:?})", self.status, marker),
            None => write!(f, "HTTP {}", self.status),
        }
    }
}
