use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::QueueError;
use crate::kernel::event::{Event, EventKind};
use crate::kernel::queue::EventQueue;

pub const SOURCE: &str = "console";

/// One line of the interactive protocol:
///
/// ```text
/// chat <author>: <text>
/// mention <author>: <text>
/// speech: <text>        (or "> <text>")
/// screen: <text>
/// quit
/// ```
///
/// Returns `None` for blank or unrecognised lines.
pub fn parse_line(line: &str) -> Option<Event> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
        return Some(Event::shutdown(SOURCE));
    }
    if let Some(text) = line.strip_prefix('>') {
        return non_empty(text).map(Event::streamer_speech);
    }

    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let command = command.trim_end_matches(':').to_ascii_lowercase();
    let rest = rest.trim();

    match command.as_str() {
        "speech" | "say" => non_empty(rest.trim_start_matches(':')).map(Event::streamer_speech),
        "screen" => non_empty(rest.trim_start_matches(':')).map(Event::screen_change),
        "chat" => authored(rest).map(|(author, text)| Event::chat_message(author, text)),
        "mention" => authored(rest).map(|(author, text)| Event::chat_mention(author, text)),
        _ => None,
    }
}

fn non_empty(text: &str) -> Option<&str> {
    let text = text.trim();
    (!text.is_empty()).then_some(text)
}

/// `<author>: <text>`
fn authored(rest: &str) -> Option<(&str, &str)> {
    let (author, text) = rest.split_once(':')?;
    Some((non_empty(author)?, non_empty(text)?))
}

/// Reads lines from `reader` and pushes the events they describe. Ends
/// after `quit`, on a read error, or once the queue is closed. EOF counts
/// as `quit`.
pub fn spawn_reader<R>(reader: R, queue: Arc<EventQueue>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("Console input closed, requesting shutdown");
                    if let Err(e) = queue.push(Event::shutdown(SOURCE)) {
                        debug!("Shutdown at EOF not queued: {}", e);
                    }
                    break;
                }
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    break;
                }
            };

            let Some(event) = parse_line(&line) else {
                if !line.trim().is_empty() {
                    warn!("Unrecognised input: {}", line.trim());
                }
                continue;
            };
            let is_shutdown = event.kind() == EventKind::Shutdown;

            match queue.push(event) {
                Ok(()) => {}
                Err(QueueError::Closed { .. }) => break,
                Err(e) => debug!("Console event not queued: {}", e),
            }
            if is_shutdown {
                break;
            }
        }
    })
}
