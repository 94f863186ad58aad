use std::time::Duration;
use tracing::debug;

use muster_presence::TypingRegistry;

/// Background task that drops expired typing indicators.
///
/// Reads already hide expired entries; this only bounds memory for chats
/// nobody is reading any more.
pub async fn run_sweep_loop(typing: TypingRegistry, interval: Duration) {
    let mut interval = tokio::time::interval(interval);

    loop {
        interval.tick().await;

        let removed = typing.sweep();
        if removed > 0 {
            debug!("Sweep: dropped {} expired typing indicators", removed);
        }
    }
}
