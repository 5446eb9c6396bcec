//! The default [`service::ServiceHandler`]: everything this binary plugs
//! into the core that the distillation marks out of scope (section 1) —
//! host ACLs, auth-file storage, and the slave process itself all reduce
//! to a small honest stub here, with the real integration point left to
//! whoever embeds this crate in a full display manager.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use rand::Rng;
use service::session::Display;
use service::ServiceHandler;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

const WILLING_SCRIPT_TIMEOUT: Duration = Duration::from_secs(2);
const WILLING_SCRIPT_MAX_LEN: usize = 256;

pub struct Handler;

impl ServiceHandler for Handler {
    fn host_allow(&self, addr: SocketAddr) -> bool {
        log::debug!("host_allow: {addr} (no ACL configured, allowing)");
        true
    }

    async fn resolve_hostname(&self, addr: SocketAddr) -> (String, Vec<SocketAddr>) {
        // Reverse DNS is a collaborator concern; the bundled default falls
        // back to the literal address, which is always correct even if
        // less friendly in logs. A full daemon wires a real resolver here.
        (addr.ip().to_string(), vec![addr])
    }

    fn cookie_new(&self) -> [u8; 16] {
        let mut cookie = [0u8; 16];
        rand::rng().fill(&mut cookie);
        cookie
    }

    async fn spawn_session(&self, display: &Display) -> bool {
        log::info!(
            "spawn_session: display={} session={:#x} hostname={}",
            display.display_number,
            display.session_id,
            display.hostname
        );
        true
    }

    async fn willing_run(&self, script_path: &Path) -> Option<String> {
        let output = tokio::time::timeout(WILLING_SCRIPT_TIMEOUT, async {
            let mut child = Command::new(script_path)
                .stdout(std::process::Stdio::piped())
                .spawn()
                .ok()?;

            let stdout = child.stdout.take()?;
            let mut line = String::new();
            BufReader::new(stdout).read_line(&mut line).await.ok()?;
            let _ = child.wait().await;
            Some(line)
        })
        .await
        .ok()
        .flatten()?;

        let trimmed = output.trim_end();
        Some(trimmed.chars().take(WILLING_SCRIPT_MAX_LEN).collect())
    }
}
