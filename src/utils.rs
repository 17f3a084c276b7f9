use crate::peer::types::ServerConfig;
use rand::Rng;

/// Short random hex id used to correlate one attempt across log lines
pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Prefix an ICE server url with `stun:`/`turn:` when it has no scheme yet
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    let has_scheme = ["stun:", "stuns:", "turn:", "turns:"]
        .iter()
        .any(|scheme| config.url.starts_with(scheme));
    if has_scheme {
        config.url.clone()
    } else {
        let scheme = if config.r#type == "turn" {
            "turn:"
        } else {
            "stun:"
        };
        format!("{}{}", scheme, config.url)
    }
}
