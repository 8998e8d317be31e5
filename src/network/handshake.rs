//! Icecast source handshake
//!
//! Legacy servers expect bare `\n` line endings throughout the request, so
//! the request is framed by hand rather than with an HTTP client.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::HandshakeFailure;

/// Marker that must appear in the server's reply
pub const SUCCESS_MARKER: &str = "HTTP/1.0 200 OK";

/// Everything needed to frame one SOURCE request
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRequest {
    pub label: String,
    pub password: String,
    pub user_agent: String,
    pub genre: String,
    /// kbps
    pub bitrate: u32,
    pub sample_rate: u32,
}

impl SourceRequest {
    /// Mountpoint the channel publishes to
    pub fn mountpoint(&self) -> String {
        format!("/{}", self.label)
    }

    fn authorization(&self) -> String {
        format!("Basic {}", STANDARD.encode(format!("source:{}", self.password)))
    }

    /// Request bytes, ending with the blank line
    pub fn to_bytes(&self) -> Vec<u8> {
        let headers = [
            ("content-type", "audio/mpeg".to_string()),
            ("Authorization", self.authorization()),
            ("User-Agent", self.user_agent.clone()),
        ];
        let ice = [
            ("ice-name", self.label.clone()),
            ("ice-genre", self.genre.clone()),
            ("ice-bitrate", self.bitrate.to_string()),
            ("ice-private", "0".to_string()),
            ("ice-public", "0".to_string()),
            ("ice-description", self.label.clone()),
            (
                "ice-audio-info",
                format!(
                    "ice-samplerate={};ice-bitrate={};ice-channels=1",
                    self.sample_rate, self.bitrate
                ),
            ),
        ];

        let mut out = format!("SOURCE {} ICE/1.0\n", self.mountpoint());
        for (name, value) in headers.iter().chain(ice.iter()) {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
        out.into_bytes()
    }
}

/// Classify the server's first reply
pub fn check_response(response: &[u8]) -> Result<(), HandshakeFailure> {
    if response.is_empty() {
        return Err(HandshakeFailure::NoResponse);
    }
    let text = String::from_utf8_lossy(response);
    if text.contains(SUCCESS_MARKER) {
        Ok(())
    } else {
        Err(HandshakeFailure::Rejected(text.trim_end().to_string()))
    }
}
