use bytes::Bytes;
use muxwire_frame::{codec, header};
use serde_json::json;

use crate::cmd::{parse_headers, BodyArgs, PackArgs};
use crate::exit::{frame_error, CliError, CliResult, SUCCESS};
use crate::output::{hex, print_raw, OutputFormat};

pub fn run(args: PackArgs, format: OutputFormat) -> CliResult<i32> {
    let block = block_from_args(&args.body)?;
    match format {
        OutputFormat::Raw => print_raw(&block),
        OutputFormat::Table | OutputFormat::Pretty => println!("{}", hex(&block)),
        OutputFormat::Json => println!(
            "{}",
            json!({
                "message_id": args.body.id,
                "length": block.len(),
                "block": hex(&block),
            })
        ),
    }
    Ok(SUCCESS)
}

/// Pack the body exactly as given: `--json` is validated but sent as typed,
/// `--data` verbatim.
pub fn block_from_args(args: &BodyArgs) -> CliResult<Bytes> {
    let body: &[u8] = match (&args.json, &args.data) {
        (Some(json), _) => {
            serde_json::from_str::<serde_json::Value>(json)
                .map_err(|err| CliError::usage(format!("--json is not valid JSON: {err}")))?;
            json.as_bytes()
        }
        (None, Some(data)) => data.as_bytes(),
        (None, None) => &[],
    };

    let mut header = parse_headers(&args.headers)?;
    header::check_user_header(&header).map_err(|err| frame_error("invalid header", err))?;
    if let Some(pattern) = &args.url {
        header::set_url_pattern(&mut header, pattern);
    }
    codec::pack_raw(args.id, body, &header).map_err(|err| frame_error("pack failed", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::USAGE;

    fn body_args(id: i32) -> BodyArgs {
        BodyArgs {
            id,
            json: None,
            data: None,
            headers: Vec::new(),
            url: None,
        }
    }

    #[test]
    fn empty_message_is_sixteen_bytes() {
        let block = block_from_args(&body_args(1)).unwrap();
        assert_eq!(hex(&block), "0000000c000000010000000000000000");
    }

    #[test]
    fn url_routes_through_reserved_header() {
        let mut args = body_args(0);
        args.url = Some("/a/b".into());
        let block = block_from_args(&args).unwrap();
        assert_eq!(codec::url_pattern_of(&block).unwrap().as_deref(), Some("/a/b"));
    }

    #[test]
    fn reserved_header_is_a_usage_error() {
        let mut args = body_args(1);
        args.headers = vec!["Pipe=enable;2".into()];
        assert_eq!(block_from_args(&args).unwrap_err().code, USAGE);
    }

    #[test]
    fn invalid_json_is_rejected() {
        let mut args = body_args(1);
        args.json = Some("{nope".into());
        assert_eq!(block_from_args(&args).unwrap_err().code, USAGE);
    }
}
