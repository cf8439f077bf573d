use anyhow::{Context, Result};
use std::net::SocketAddr;

use crate::LinkConfig;

pub fn check_link(cfg: &LinkConfig) -> Result<()> {
    cfg.bind
        .parse::<SocketAddr>()
        .with_context(|| format!("link.bind is not a socket address: {}", cfg.bind))?;
    anyhow::ensure!(cfg.max_frame_bytes() >= 64, "link.max_frame_bytes too small (min 64)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(bind: &str, max_frame: Option<usize>) -> LinkConfig {
        LinkConfig { bind: bind.into(), max_frame_bytes: max_frame, event_queue: None }
    }

    #[test]
    fn accepts_defaults() {
        check_link(&cfg("0.0.0.0:8080", None)).unwrap();
    }

    #[test]
    fn rejects_hostname_and_tiny_frames() {
        assert!(check_link(&cfg("gimbal.local:80", None)).is_err());
        assert!(check_link(&cfg("127.0.0.1:80", Some(8))).is_err());
    }
}
