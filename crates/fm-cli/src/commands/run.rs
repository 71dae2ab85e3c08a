//! Run command: the long-lived measuring loop.

use std::cell::Cell;
use std::future::Future;
use std::io::Write;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use fm_core::{Coordinator, StateStore, ValueSource, parse_condition};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use super::util::{write_header, write_meters};
use crate::instance::{Instance, now_in};

/// Runs until stdin closes (when reading conditions) or ctrl-c.
pub fn run<W: Write>(
    writer: &mut W,
    instance: &mut Instance,
    heartbeat: Duration,
    read_conditions: bool,
) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize tokio runtime")?;

    let result = runtime.block_on(async {
        let conditions =
            read_conditions.then(|| BufReader::new(tokio::io::stdin()).lines());
        let shutdown = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };
        drive(
            writer,
            &mut instance.coordinator,
            instance.timezone,
            heartbeat,
            conditions,
            shutdown,
        )
        .await
    });
    // The stdin reader may still be blocked on a read.
    runtime.shutdown_background();
    result
}

/// Feeds heartbeats and condition lines into the coordinator.
///
/// Meters are printed whenever the coordinator notifies its listeners. A
/// rejected update is logged and the loop carries on.
pub async fn drive<W, V, S, R, F>(
    writer: &mut W,
    coordinator: &mut Coordinator<V, S>,
    timezone: Tz,
    heartbeat: Duration,
    mut conditions: Option<Lines<R>>,
    shutdown: F,
) -> Result<()>
where
    W: Write,
    V: ValueSource,
    S: StateStore,
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    let updated = Rc::new(Cell::new(false));
    let listener = {
        let updated = Rc::clone(&updated);
        coordinator.add_listener(move || {
            updated.set(true);
            Ok(())
        })
    };

    let mut interval = tokio::time::interval(heartbeat);
    tokio::pin!(shutdown);
    tracing::info!(
        coordinator = %coordinator.name(),
        heartbeat_secs = heartbeat.as_secs(),
        conditions = conditions.is_some(),
        "measuring"
    );

    loop {
        if updated.replace(false) {
            write_header(writer, coordinator)?;
            write_meters(writer, coordinator)?;
            writer.flush()?;
        }

        tokio::select! {
            _ = interval.tick() => {
                if let Err(err) = coordinator.heartbeat(now_in(timezone)) {
                    tracing::error!(error = %err, "heartbeat failed");
                }
            }
            line = next_line(&mut conditions) => {
                let Some(line) = line.context("failed to read condition from stdin")? else {
                    tracing::info!("stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let result =
                    coordinator.condition_changed(now_in(timezone), parse_condition(&line));
                if let Err(err) = result {
                    tracing::error!(error = %err, "condition update failed");
                }
            }
            () = &mut shutdown => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    coordinator.remove_listener(listener);
    Ok(())
}

async fn next_line<R>(lines: &mut Option<Lines<R>>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}
