use std::net::{Ipv4Addr, SocketAddr};

pub const DEFAULT_PORT: u16 = 51244;

pub const DEFAULT_ADDR: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

const TELEMETRY_BIND: &str = "TELEMETRY_BIND";

/// Listener address override from the environment
pub fn get_bind_override() -> Option<SocketAddr> {
    let bind_from_env = std::env::var(TELEMETRY_BIND).ok()?;
    bind_from_env.parse().ok()
}

const TELEMETRY_TOKEN: &str = "TELEMETRY_TOKEN";

/// API token override from the environment
pub fn get_token_override() -> Option<String> {
    let token_from_env = std::env::var(TELEMETRY_TOKEN);
    token_from_env.ok().filter(|token| !token.is_empty())
}
