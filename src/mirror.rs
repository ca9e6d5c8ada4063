// ==================== REMOTE MIRROR ====================
// Optional secondary copy in a remote JSON tree, laid out as
// scores/<category>/<nameLower> and users/<nameLower>.

use std::{sync::Arc, thread, time::Duration};

use serde_json::Value;

use crate::error::MirrorError;

/// Capability the stores compose over. Implementations must be cheap to share.
pub trait RemoteMirror: Send + Sync {
    /// `Ok(None)` when nothing is stored at `path`
    fn get(&self, path: &str) -> Result<Option<Value>, MirrorError>;

    fn set(&self, path: &str, value: &Value) -> Result<(), MirrorError>;
}

/// REST tree client: GET/PUT `<base>/<path>.json[?auth=<token>]`
pub struct RestMirror {
    base_url: String,
    auth_token: Option<String>,
    agent: ureq::Agent,
}

impl RestMirror {
    pub fn new(base_url: &str, auth_token: Option<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.filter(|token| !token.trim().is_empty()),
            agent,
        }
    }

    fn url(&self, path: &str) -> String {
        let url = format!("{}/{}.json", self.base_url, path.trim_matches('/'));
        match &self.auth_token {
            Some(token) => format!("{}?auth={}", url, token),
            None => url,
        }
    }
}

impl RemoteMirror for RestMirror {
    fn get(&self, path: &str) -> Result<Option<Value>, MirrorError> {
        let response = self.agent.get(&self.url(path)).call().map_err(map_ureq_error)?;
        let value: Value = response
            .into_json()
            .map_err(|e| MirrorError::Decode(e.to_string()))?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    fn set(&self, path: &str, value: &Value) -> Result<(), MirrorError> {
        self.agent
            .put(&self.url(path))
            .send_json(value.clone())
            .map_err(map_ureq_error)?;
        Ok(())
    }
}

fn map_ureq_error(err: ureq::Error) -> MirrorError {
    match err {
        ureq::Error::Status(code, _) => MirrorError::Status(code),
        ureq::Error::Transport(transport) => MirrorError::Transport(transport.to_string()),
    }
}

/// Encode a path segment as ASCII letters, digits and `-` only. Every other
/// byte, `_` included, becomes `_XX` (uppercase hex), so distinct segments
/// never share a path and nothing a REST tree forbids reaches the URL.
pub fn encode_segment(segment: &str) -> String {
    if segment.is_empty() {
        return "_".to_string();
    }
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("_{:02X}", byte));
        }
    }
    encoded
}

pub fn score_path(category: &str, name_lower: &str) -> String {
    format!("scores/{}/{}", encode_segment(category), encode_segment(name_lower))
}

pub fn account_path(name_lower: &str) -> String {
    format!("users/{}", encode_segment(name_lower))
}

/// Write to the mirror on a detached thread. Failures are logged only.
pub fn set_in_background(mirror: Arc<dyn RemoteMirror>, path: String, value: Value) {
    let spawned = thread::Builder::new()
        .name("mirror-write".to_string())
        .spawn(move || {
            if let Err(err) = mirror.set(&path, &value) {
                log::warn!("[MIRROR] write failed path:{} error:{}", path, err);
            } else {
                log::debug!("[MIRROR] wrote path:{}", path);
            }
        });
    if let Err(err) = spawned {
        log::warn!("[MIRROR] could not spawn writer error:{}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_encoded() {
        assert_eq!(score_path("overall", "ada"), "scores/overall/ada");
        assert_eq!(score_path("hard.mode", "a/b#c"), "scores/hard_2Emode/a_2Fb_23c");
        assert_eq!(account_path("j.$[x]"), "users/j_2E_24_5Bx_5D");
        assert_eq!(account_path("a_b"), "users/a_5Fb");
        assert_eq!(account_path("josé"), "users/jos_C3_A9");
        assert_eq!(encode_segment(""), "_");
    }

    #[test]
    fn test_distinct_segments_get_distinct_paths() {
        let names = ["a.b", "a_b", "a#b", "a/b", "a_2Eb", "a$b", "a b", "a", "_", "", "A"];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(account_path(a), account_path(b), "{:?} vs {:?}", a, b);
            }
        }
        assert_ne!(score_path("overall", "x/y"), score_path("overall/x", "y"));
        assert_ne!(score_path("hard", "a.b"), score_path("hard", "a_b"));
    }

    #[test]
    fn test_rest_urls() {
        let mirror = RestMirror::new("https://tree.example.com/", None, Duration::from_secs(1));
        assert_eq!(mirror.url("users/ada"), "https://tree.example.com/users/ada.json");

        let mirror = RestMirror::new(
            "https://tree.example.com",
            Some("secret".to_string()),
            Duration::from_secs(1),
        );
        assert_eq!(
            mirror.url("/scores/overall/ada/"),
            "https://tree.example.com/scores/overall/ada.json?auth=secret"
        );
    }

    #[test]
    fn test_blank_token_is_ignored() {
        let mirror = RestMirror::new("http://x", Some("  ".to_string()), Duration::from_secs(1));
        assert_eq!(mirror.url("users/a"), "http://x/users/a.json");
    }
}
