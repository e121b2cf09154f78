use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pktlink_frame::{build_table, render_table, TableStyle};
use serde::Serialize;

use crate::cmd::CrcTableArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct TableOutput {
    polynomial: u8,
    table: Vec<u8>,
}

pub fn run(args: CrcTableArgs, format: OutputFormat) -> CliResult<i32> {
    if let Some(style) = args.style {
        print!("{}", render_table(args.polynomial, style.into()));
        return Ok(SUCCESS);
    }

    let table = build_table(args.polynomial);
    match format {
        OutputFormat::Json => {
            let out = TableOutput {
                polynomial: args.polynomial,
                table: table.to_vec(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut grid = Table::new();
            let mut header = vec![String::new()];
            header.extend((0..16).map(|col| format!("x{col:X}")));
            grid.load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(header);
            for (row, chunk) in table.chunks(16).enumerate() {
                let mut cells = vec![format!("{row:X}x")];
                cells.extend(chunk.iter().map(|byte| format!("{byte:02x}")));
                grid.add_row(cells);
            }
            println!("{grid}");
        }
        OutputFormat::Pretty => print!("{}", render_table(args.polynomial, TableStyle::C)),
    }
    Ok(SUCCESS)
}
