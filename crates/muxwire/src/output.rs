use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use muxwire_frame::{codec, Header};
use serde_json::{json, Value};

use crate::exit::{frame_error, CliResult};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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

/// One decoded block, ready to print.
#[derive(Debug)]
pub struct BlockView {
    pub message_id: i32,
    pub header: Header,
    pub body: Vec<u8>,
}

impl BlockView {
    pub fn parse(block: &[u8]) -> CliResult<Self> {
        let decode = |err| frame_error("malformed reply", err);
        Ok(Self {
            message_id: codec::message_id_of(block).map_err(decode)?,
            header: codec::header_of(block).map_err(decode)?,
            body: codec::body_bytes_of(block).map_err(decode)?.to_vec(),
        })
    }
}

pub fn print_block(view: &BlockView, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = json!({
                "message_id": view.message_id,
                "header": view.header,
                "body_size": view.body.len(),
                "body": body_value(&view.body),
                "peer": peer,
            });
            println!("{out}");
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "HEADER", "SIZE", "PEER", "BODY"])
                .add_row(vec![
                    view.message_id.to_string(),
                    Value::Object(view.header.clone()).to_string(),
                    view.body.len().to_string(),
                    peer.to_string(),
                    body_preview(&view.body),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "id={} header={} size={} peer={} body={}",
                view.message_id,
                Value::Object(view.header.clone()),
                view.body.len(),
                peer,
                body_preview(&view.body)
            );
        }
        OutputFormat::Raw => print_raw(&view.body),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Lowercase hex, two characters per byte.
pub fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

/// JSON bodies are embedded as values; anything else becomes a string preview.
fn body_value(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap_or_else(|_| Value::String(body_preview(body)))
}

fn body_preview(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", body.len()),
    }
}
