use std::sync::Arc;

use pktlink_peer::{PeerConfig, Server};
use pktlink_schema::Registry;
use tracing::info;

use crate::cmd::{assign, parse_duration, parse_id, split_assignment, ServeArgs};
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_listening, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let registry = args.registry.build_registry()?;
    for seed in &args.set {
        let (id, field, value) = split_seed(seed)?;
        assign(&registry, id, field, value)?;
    }
    let subscriptions = default_subscriptions(&args, &registry);

    let config = PeerConfig {
        poll_timeout: parse_duration(&args.poll_timeout)?,
        status_interval: parse_duration(&args.interval)?,
        frame: args.registry.frame_config(),
    };
    let server = Server::bind(args.addr.as_str(), Arc::new(registry))
        .map_err(|err| peer_error("bind failed", err))?
        .with_config(config);
    for id in subscriptions {
        server
            .subscribe(id)
            .map_err(|err| peer_error("subscribe failed", err))?;
    }

    let handle = server.shutdown_handle();
    ctrlc::set_handler(move || handle.trigger()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })?;

    print_listening(server.local_addr(), &server.subscriptions().ids(), format);
    server
        .serve()
        .map_err(|err| peer_error("serve failed", err))?;
    info!("shutdown complete");
    Ok(SUCCESS)
}

fn default_subscriptions(args: &ServeArgs, registry: &Registry) -> Vec<u8> {
    match &args.subscribe {
        Some(ids) => ids.clone(),
        None if args.registry.definitions.is_none() && registry.contains(1) => vec![1],
        None => Vec::new(),
    }
}

/// Split `ID.FIELD=VALUE`.
fn split_seed(seed: &str) -> CliResult<(u8, &str, &str)> {
    let (target, value) = split_assignment(seed)?;
    let (id, field) = target
        .split_once('.')
        .ok_or_else(|| CliError::new(USAGE, format!("expected ID.FIELD=VALUE, got {seed:?}")))?;
    let id = parse_id(id).map_err(|err| CliError::new(USAGE, err))?;
    Ok((id, field, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_name_message_and_field() {
        assert_eq!(split_seed("1.value=2.5").unwrap(), (1, "value", "2.5"));
        assert_eq!(split_seed("0x02.value_2=-1").unwrap(), (2, "value_2", "-1"));
        assert_eq!(split_seed("value=2.5").unwrap_err().code, USAGE);
        assert_eq!(split_seed("x.value=2.5").unwrap_err().code, USAGE);
    }
}
