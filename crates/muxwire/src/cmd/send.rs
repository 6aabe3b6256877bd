use std::time::Duration;

use muxwire_frame::{block_of_bytes, FrameConfig, FrameReader, FrameWriter};
use muxwire_server::DEFAULT_DATAGRAM_BUFFER;
use muxwire_transport::{connect_datagram, ClientStream, Network, TransportKind};

use crate::cmd::{parse_duration, pack::block_from_args, SendArgs};
use crate::exit::{frame_error, io_error, transport_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_block, BlockView, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let network: Network = args
        .network
        .parse()
        .map_err(|err| transport_error("invalid network", err))?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let block = block_from_args(&args.body)?;

    let reply = match network.kind() {
        TransportKind::Stream => send_stream(network, &args, &block, wait_timeout)?,
        TransportKind::Datagram => send_datagram(network, &args, &block, wait_timeout)?,
    };

    if let Some(reply) = reply {
        print_block(&BlockView::parse(&reply)?, &args.addr, format);
    }
    Ok(SUCCESS)
}

fn send_stream(
    network: Network,
    args: &SendArgs,
    block: &[u8],
    wait_timeout: Duration,
) -> CliResult<Option<Vec<u8>>> {
    let stream = ClientStream::connect(network, &args.addr)
        .map_err(|err| transport_error("connect failed", err))?;
    let read_half = stream
        .try_clone()
        .map_err(|err| transport_error("connect failed", err))?;

    let config = FrameConfig {
        read_timeout: Some(wait_timeout),
        write_timeout: Some(wait_timeout),
        ..FrameConfig::default()
    };
    let mut writer = FrameWriter::with_config_client(stream, config.clone())
        .map_err(|err| frame_error("connect failed", err))?;
    writer
        .write_block(block)
        .and_then(|()| writer.flush())
        .map_err(|err| frame_error("send failed", err))?;

    if !args.wait {
        return Ok(None);
    }

    let mut reader = FrameReader::with_config_client(read_half, config)
        .map_err(|err| frame_error("receive failed", err))?;
    match reader.read_block() {
        Ok(Some(reply)) => Ok(Some(reply.to_vec())),
        Ok(None) => Err(CliError::new(
            FAILURE,
            "receive failed: connection closed before a reply arrived",
        )),
        Err(err) => Err(frame_error("receive failed", err)),
    }
}

fn send_datagram(
    network: Network,
    args: &SendArgs,
    block: &[u8],
    wait_timeout: Duration,
) -> CliResult<Option<Vec<u8>>> {
    let socket = connect_datagram(network, &args.addr)
        .map_err(|err| transport_error("connect failed", err))?;
    socket
        .send(block)
        .map_err(|err| io_error("send failed", err))?;

    if !args.wait {
        return Ok(None);
    }

    socket
        .set_read_timeout(Some(wait_timeout))
        .map_err(|err| io_error("receive failed", err))?;
    let mut buf = vec![0u8; DEFAULT_DATAGRAM_BUFFER];
    let n = socket
        .recv(&mut buf)
        .map_err(|err| io_error("receive failed", err))?;
    let reply = block_of_bytes(&buf[..n]).map_err(|err| frame_error("receive failed", err))?;
    Ok(Some(reply.to_vec()))
}
