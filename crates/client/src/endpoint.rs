//! Channel endpoint construction.
//!
//! A room channel lives at `<scheme>://<host>/<path>/<room>/?token=<credential>`.
//! The channel scheme follows the security of the configured base URL:
//! `https` (or `wss`) yields `wss`, `http` (or `ws`) yields `ws`.

use roomlink_core::room::RoomId;
use url::Url;

use crate::config::ClientConfig;

/// Query parameter carrying the bearer credential.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Map a page/base scheme to the matching real-time channel scheme.
pub fn channel_scheme(base_scheme: &str) -> Result<&'static str, EndpointError> {
    match base_scheme {
        "https" | "wss" => Ok("wss"),
        "http" | "ws" => Ok("ws"),
        other => Err(EndpointError::UnsupportedScheme(other.to_string())),
    }
}

/// Build the channel URL for `room`, authenticated with `token`.
pub fn channel_url(
    config: &ClientConfig,
    room: &RoomId,
    token: &str,
) -> Result<Url, EndpointError> {
    let mut url = Url::parse(&config.base_url)
        .map_err(|e| EndpointError::InvalidBaseUrl(format!("{}: {e}", config.base_url)))?;

    let scheme = channel_scheme(url.scheme())?;
    url.set_scheme(scheme)
        .map_err(|()| EndpointError::UnsupportedScheme(url.scheme().to_string()))?;

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| EndpointError::InvalidBaseUrl(config.base_url.clone()))?;
        segments.pop_if_empty();
        for part in config.ws_path.split('/').filter(|p| !p.is_empty()) {
            segments.push(part);
        }
        segments.push(room.as_str());
        // Trailing slash: the server routes `<room>/`.
        segments.push("");
    }

    url.set_fragment(None);
    url.set_query(None);
    url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);

    Ok(url)
}

/// Render a channel URL for logs with the credential masked.
pub fn redacted(url: &Url) -> String {
    let mut masked = url.clone();
    masked.set_query(None);
    format!("{masked}?{TOKEN_QUERY_PARAM}=***")
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Unsupported scheme for real-time channel: {0}")]
    UnsupportedScheme(String),
}
