//! Line-oriented command loop.
//!
//! Each input line is a bot command; each reply is one line of JSON. Lines
//! starting with `:` are console commands:
//! `:history`, `:watch <transferId>` and `:quit`.

use crate::app::App;
use crate::error::BotResult;
use futures::StreamExt;
use guildbridge_transfer::TransferId;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

async fn write_json<W: AsyncWrite + Unpin>(output: &mut W, value: &Value) -> BotResult<()> {
    output.write_all(value.to_string().as_bytes()).await?;
    output.write_all(b"\n").await?;
    Ok(())
}

/// Print transfer snapshots until the transfer finishes
pub async fn watch_transfer<W: AsyncWrite + Unpin>(
    app: &App,
    transfer_id: TransferId,
    output: &mut W,
) -> BotResult<()> {
    let mut snapshots = Box::pin(app.watch(transfer_id).await?);
    while let Some(snapshot) = snapshots.next().await {
        let value = match snapshot {
            Ok(job) => serde_json::to_value(&job).unwrap_or(Value::Null),
            Err(e) => json!({ "success": false, "error": e.to_string() }),
        };
        write_json(output, &value).await?;
        output.flush().await?;
    }
    Ok(())
}

/// Run commands from `input` until it ends or `:quit`. Returns the number
/// of lines handled.
pub async fn run_repl<R, W>(app: &App, input: R, mut output: W) -> BotResult<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut handled = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        handled += 1;

        match line.split_once(' ').map_or((line, ""), |(head, rest)| (head, rest.trim())) {
            (":quit" | ":exit", _) => break,
            (":history", _) => {
                let history = app.dispatcher().history();
                write_json(&mut output, &json!({ "history": history })).await?;
            }
            (":watch", id) => match id.parse::<TransferId>() {
                Ok(transfer_id) => {
                    if let Err(e) = watch_transfer(app, transfer_id, &mut output).await {
                        write_json(&mut output, &json!({ "success": false, "error": e.to_string() }))
                            .await?;
                    }
                }
                Err(e) => {
                    write_json(&mut output, &json!({ "success": false, "error": e.to_string() }))
                        .await?;
                }
            },
            _ => {
                let reply = app.run_command(line).await;
                write_json(&mut output, &reply).await?;
            }
        }
        output.flush().await?;
    }

    debug!(handled, "Input finished");
    Ok(handled)
}
