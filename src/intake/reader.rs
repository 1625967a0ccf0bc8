// Line reader for stdin, files and other byte streams

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{split_stamped, RawLine};

/// Read lines from `reader` and forward them until EOF or the receiver goes away.
///
/// With `stamped` each line is a replay row carrying its own receive time;
/// otherwise lines are stamped with the current station time on arrival.
/// Returns the number of lines forwarded.
pub async fn read_lines<R>(reader: R, tx: mpsc::Sender<RawLine>, stamped: bool) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let raw = if stamped {
            match split_stamped(line) {
                Some((received_at_ms, text)) => RawLine {
                    text,
                    received_at_ms: Some(received_at_ms),
                },
                None => {
                    debug!("Skipping unstamped replay row: {}", line);
                    continue;
                }
            }
        } else {
            RawLine::stamped_now(line.to_string())
        };

        if tx.send(raw).await.is_err() {
            warn!("Line consumer closed, stopping reader");
            break;
        }
        forwarded += 1;
    }

    Ok(forwarded)
}
