use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use pktlink_frame::{Crc8, FrameConfig, TableStyle};
use pktlink_schema::{FieldType, MessageSchema, Registry, SchemaError, Value};

use crate::exit::{schema_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod crc_table;
pub mod send;
pub mod serve;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the message registry over TCP and publish status frames.
    Serve(ServeArgs),
    /// Connect to a server and print decoded messages.
    Watch(WatchArgs),
    /// Send one message to a server.
    Send(SendArgs),
    /// Print the CRC-8 lookup table.
    CrcTable(CrcTableArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Watch(args) => watch::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::CrcTable(args) => crc_table::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where message schemas come from and how trailers are handled.
#[derive(Args, Debug, Clone, Default)]
pub struct RegistryArgs {
    /// JSON message definitions. Default: the two-message demo set.
    #[arg(long, value_name = "FILE")]
    pub definitions: Option<PathBuf>,
    /// Write CRC-8 trailers and reject frames whose trailer does not match.
    #[arg(long)]
    pub crc: bool,
}

impl RegistryArgs {
    pub fn build_registry(&self) -> CliResult<Registry> {
        let mut registry = match &self.definitions {
            Some(path) => Registry::from_file(path).map_err(|err| {
                schema_error(&format!("failed loading {}", path.display()), err)
            })?,
            None => demo_registry().map_err(|err| schema_error("demo registry", err))?,
        };
        if self.crc {
            registry.set_checksum(Arc::new(Crc8::default()));
        }
        Ok(registry)
    }

    pub fn frame_config(&self) -> FrameConfig {
        if self.crc {
            FrameConfig {
                verify_trailer: true,
                checksum: Arc::new(Crc8::default()),
                ..FrameConfig::default()
            }
        } else {
            FrameConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on. Port 0 picks a free port.
    #[arg(default_value = "127.0.0.1:0")]
    pub addr: String,
    /// Message ids to publish as status (comma-separated). Default: 1 for the demo set.
    #[arg(long, value_delimiter = ',', value_parser = parse_id)]
    pub subscribe: Option<Vec<u8>>,
    /// Seed a live value before serving, as ID.FIELD=VALUE (repeatable).
    #[arg(long, value_name = "ID.FIELD=VALUE")]
    pub set: Vec<String>,
    /// Minimum time between status publications (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub interval: String,
    /// Longest a worker blocks on input before checking timers.
    #[arg(long, default_value = "100ms")]
    pub poll_timeout: String,
    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Server address to connect to.
    pub addr: String,
    /// Only print these message ids (comma-separated).
    #[arg(long, value_delimiter = ',', value_parser = parse_id)]
    pub ids: Option<Vec<u8>>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Fail if no frame arrives for this long (e.g. 5s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server address to connect to.
    pub addr: String,
    /// Message id to send.
    #[arg(long, value_parser = parse_id, required_unless_present = "raw")]
    pub id: Option<u8>,
    /// Field assignment as FIELD=VALUE (repeatable).
    #[arg(long, value_name = "FIELD=VALUE", conflicts_with = "raw")]
    pub set: Vec<String>,
    /// Send this pre-encoded frame (hex) unchanged.
    #[arg(long, value_name = "HEX", conflicts_with = "id")]
    pub raw: Option<String>,
    /// Wait for one decoded frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StyleArg {
    C,
    Python,
    Rust,
}

impl From<StyleArg> for TableStyle {
    fn from(style: StyleArg) -> Self {
        match style {
            StyleArg::C => TableStyle::C,
            StyleArg::Python => TableStyle::Python,
            StyleArg::Rust => TableStyle::Rust,
        }
    }
}

#[derive(Args, Debug)]
pub struct CrcTableArgs {
    /// Generator polynomial (decimal or 0x-prefixed hex).
    #[arg(long, default_value = "0x07", value_parser = parse_id)]
    pub polynomial: u8,
    /// Emit source text in this language instead of the --format rendering.
    #[arg(long)]
    pub style: Option<StyleArg>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// The two telemetry messages a bare `serve` publishes.
pub fn demo_registry() -> pktlink_schema::Result<Registry> {
    let mut registry = Registry::new();
    registry.register(MessageSchema::new(1, "Server Value").with_field(
        "value",
        FieldType::F32,
        0.0f32,
    )?);
    registry.register(MessageSchema::new(2, "Server Value 2").with_field(
        "value_2",
        FieldType::F32,
        0.0f32,
    )?);
    Ok(registry)
}

/// Parse a byte given in decimal or `0x` hex.
pub fn parse_id(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse::<u8>(),
    };
    parsed.map_err(|_| format!("expected a byte (0-255 or 0x00-0xff), got {input:?}"))
}

/// Split `FIELD=VALUE`.
pub fn split_assignment(input: &str) -> CliResult<(&str, &str)> {
    input
        .split_once('=')
        .filter(|(field, _)| !field.is_empty())
        .ok_or_else(|| CliError::new(USAGE, format!("expected FIELD=VALUE, got {input:?}")))
}

/// Set `field` of message `id` from command-line text.
pub fn assign(registry: &Registry, id: u8, field: &str, text: &str) -> CliResult<()> {
    let ty = field_type(registry, id, field).map_err(|err| schema_error("invalid --set", err))?;
    let value = Value::parse(ty, text).map_err(|err| schema_error("invalid --set", err))?;
    registry
        .set(id, field, value)
        .map_err(|err| schema_error("invalid --set", err))
}

fn field_type(registry: &Registry, id: u8, field: &str) -> pktlink_schema::Result<FieldType> {
    let schema = registry
        .resolve(id)
        .ok_or(SchemaError::UnknownMessageId(id))?;
    schema
        .field_index(field)
        .map(|index| schema.fields()[index].ty)
        .ok_or_else(|| SchemaError::UnknownField {
            id,
            field: field.to_string(),
        })
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
