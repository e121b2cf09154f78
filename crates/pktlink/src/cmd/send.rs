use std::sync::Arc;
use std::time::{Duration, Instant};

use pktlink_peer::{connect_with_config, Connection, InputEvent};
use pktlink_transport::LinkStream;

use crate::cmd::watch::print_decoded;
use crate::cmd::{assign, parse_duration, split_assignment, SendArgs};
use crate::exit::{peer_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::OutputFormat;

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let registry = Arc::new(args.registry.build_registry()?);

    let outgoing = match (&args.raw, args.id) {
        (Some(hex), _) => Outgoing::Raw(parse_hex(hex)?),
        (None, Some(id)) => {
            for assignment in &args.set {
                let (field, value) = split_assignment(assignment)?;
                assign(&registry, id, field, value)?;
            }
            Outgoing::Message(id)
        }
        (None, None) => return Err(CliError::new(USAGE, "either --id or --raw is required")),
    };

    let mut conn = connect_with_config(
        args.addr.as_str(),
        Arc::clone(&registry),
        args.registry.frame_config(),
    )
    .map_err(|err| peer_error("connect failed", err))?;

    let sent = match outgoing {
        Outgoing::Message(id) => conn.send(id),
        Outgoing::Raw(bytes) => conn.send_packed(&bytes),
    };
    sent.map_err(|err| peer_error("send failed", err))?;

    if args.wait {
        let id = wait_for_message(&mut conn, wait_timeout)?;
        print_decoded(&registry, id, conn.peer(), format)?;
    }

    Ok(SUCCESS)
}

enum Outgoing {
    Message(u8),
    Raw(Vec<u8>),
}

fn wait_for_message(
    conn: &mut Connection<LinkStream, LinkStream>,
    timeout: Duration,
) -> CliResult<u8> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CliError::new(
                TIMEOUT,
                format!("no message received within {timeout:?}"),
            ));
        }
        match conn.process_input(Some(remaining)) {
            Ok(InputEvent::Decoded(id)) => return Ok(id),
            Ok(_) => continue,
            Err(err) => return Err(peer_error("receive failed", err)),
        }
    }
}

/// Decode hex text, ignoring whitespace and an optional `0x` prefix.
fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if digits.is_empty() || digits.len() % 2 != 0 || !digits.is_ascii() {
        return Err(CliError::new(
            USAGE,
            format!("--raw needs an even number of hex digits, got {input:?}"),
        ));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| CliError::new(USAGE, format!("invalid hex in --raw: {input:?}")))
        })
        .collect()
}
