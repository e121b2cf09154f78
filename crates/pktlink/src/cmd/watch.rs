use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pktlink_peer::{connect_with_config, InputEvent, PeerError};
use pktlink_schema::Registry;
use tracing::info;

use crate::cmd::{parse_duration, WatchArgs};
use crate::exit::{
    peer_error, schema_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, TIMEOUT,
};
use crate::output::{print_message, MessageView, OutputFormat};

const POLL: Duration = Duration::from_millis(100);

pub fn run(args: WatchArgs, format: OutputFormat) -> CliResult<i32> {
    let idle_limit = args.timeout.as_deref().map(parse_duration).transpose()?;
    let registry = Arc::new(args.registry.build_registry()?);
    let mut conn = connect_with_config(
        args.addr.as_str(),
        Arc::clone(&registry),
        args.registry.frame_config(),
    )
    .map_err(|err| peer_error("connect failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    let mut printed = 0usize;
    let mut last_frame = Instant::now();

    while running.load(Ordering::SeqCst) {
        let id = match conn.process_input(Some(POLL)) {
            Ok(InputEvent::Decoded(id)) => id,
            Ok(InputEvent::UnknownId(_) | InputEvent::Malformed(_)) => {
                last_frame = Instant::now();
                continue;
            }
            Ok(InputEvent::Idle) => {
                if let Some(limit) = idle_limit {
                    if last_frame.elapsed() >= limit {
                        return Err(CliError::new(
                            TIMEOUT,
                            format!("no frames received within {limit:?}"),
                        ));
                    }
                }
                continue;
            }
            Err(PeerError::Closed) => return closed(printed, args.count),
            Err(err) => return Err(peer_error("receive failed", err)),
        };
        last_frame = Instant::now();

        if let Some(ids) = &args.ids {
            if !ids.contains(&id) {
                continue;
            }
        }

        print_decoded(&registry, id, conn.peer(), format)?;
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                return Ok(SUCCESS);
            }
        }
    }

    Ok(SUCCESS)
}

pub(crate) fn print_decoded(
    registry: &Registry,
    id: u8,
    peer: &str,
    format: OutputFormat,
) -> CliResult<()> {
    let fields = registry
        .named_snapshot(id)
        .map_err(|err| schema_error("snapshot failed", err))?;
    let name = registry.resolve(id).map_or("", |schema| schema.name());
    print_message(
        &MessageView {
            id,
            name,
            peer,
            fields: &fields,
        },
        format,
    );
    Ok(())
}

fn closed(printed: usize, count: Option<usize>) -> CliResult<i32> {
    info!(printed, "server closed the connection");
    match count {
        Some(count) if printed < count => Err(CliError::new(
            FAILURE,
            format!("connection closed after {printed} of {count} messages"),
        )),
        _ => Ok(SUCCESS),
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_before_count_is_a_failure() {
        assert_eq!(closed(3, None).unwrap(), SUCCESS);
        assert_eq!(closed(3, Some(3)).unwrap(), SUCCESS);
        assert_eq!(closed(1, Some(3)).unwrap_err().code, FAILURE);
    }
}
