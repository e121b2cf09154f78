use std::io::IsTerminal;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pktlink_schema::Value;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One decoded message as printed by `watch` and `send --wait`.
pub struct MessageView<'a> {
    pub id: u8,
    pub name: &'a str,
    pub peer: &'a str,
    pub fields: &'a [(String, Value)],
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    event: &'static str,
    id: u8,
    name: &'a str,
    peer: &'a str,
    fields: serde_json::Map<String, serde_json::Value>,
    timestamp: String,
}

#[derive(Serialize)]
struct ListeningOutput {
    event: &'static str,
    addr: String,
    subscriptions: Vec<u8>,
}

pub fn print_message(message: &MessageView<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                event: "message",
                id: message.id,
                name: message.name,
                peer: message.peer,
                fields: message
                    .fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "MESSAGE", "FIELD", "TYPE", "VALUE"]);
            for (name, value) in message.fields {
                table.add_row(vec![
                    format!("{:#04x}", message.id),
                    message.name.to_string(),
                    name.clone(),
                    value.kind().to_string(),
                    value.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let fields = message
                .fields
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!(
                "id={:#04x} ({}) peer={} {}",
                message.id, message.name, message.peer, fields
            );
        }
    }
}

pub fn print_listening(addr: SocketAddr, subscriptions: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ListeningOutput {
                event: "listening",
                addr: addr.to_string(),
                subscriptions: subscriptions.to_vec(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("listening on {addr} (status ids: {subscriptions:?})");
        }
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
