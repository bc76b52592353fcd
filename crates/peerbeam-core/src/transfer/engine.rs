//! Chunked send and receive over an ordered data channel.
//!
//! The sender announces the file, streams it in chunks of exactly
//! `chunk_size` bytes (the last one may be shorter) and only reports
//! completion once the receiver answers with `ACK`. Before every chunk the
//! sender checks the channel's buffered amount and, above the configured
//! threshold, waits for the channel's buffered-amount-low event.

use std::path::Path;

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;

use super::frame::Frame;
use super::TransferConfig;
use crate::error::{Error, Result};
use crate::file::FileMetadata;
use crate::status::{percent, Phase, StatusReporter};
use crate::transport::{ChannelEvent, ChannelMessage, DataChannelHandle};

/// A fully reassembled file.
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    /// Metadata announced by the sender
    pub metadata: FileMetadata,
    /// File contents, chunks concatenated in arrival order
    pub data: Bytes,
}

async fn next_event(handle: &mut DataChannelHandle, waiting_for: &str) -> Result<ChannelEvent> {
    match handle.events.recv().await {
        Some(ChannelEvent::Closed) | None => Err(Error::Transport(format!(
            "data channel closed while waiting for {waiting_for}"
        ))),
        Some(event) => Ok(event),
    }
}

/// Wait until the channel reports open.
pub(crate) async fn wait_open(handle: &mut DataChannelHandle) -> Result<()> {
    if handle.channel.is_open() {
        return Ok(());
    }
    loop {
        if let ChannelEvent::Open = next_event(handle, "the channel to open").await? {
            return Ok(());
        }
    }
}

/// Wait until the channel reports closed, discarding anything else.
pub(crate) async fn wait_closed(handle: &mut DataChannelHandle) {
    while let Some(event) = handle.events.recv().await {
        if matches!(event, ChannelEvent::Closed) {
            break;
        }
    }
}

async fn wait_for_drain(handle: &mut DataChannelHandle, threshold: usize) -> Result<()> {
    while handle.channel.buffered_amount().await > threshold {
        tracing::trace!("Send buffer above {} bytes, pausing", threshold);
        loop {
            match next_event(handle, "the send buffer to drain").await? {
                ChannelEvent::BufferedAmountLow => break,
                ChannelEvent::Message(message) => {
                    tracing::debug!("Ignoring {} byte message during send", message.len());
                }
                ChannelEvent::Open | ChannelEvent::Closed => {}
            }
        }
    }
    Ok(())
}

async fn wait_for_ack(handle: &mut DataChannelHandle) -> Result<()> {
    loop {
        if let ChannelEvent::Message(message) = next_event(handle, "the acknowledgement").await? {
            match Frame::decode(message) {
                Ok(Frame::Ack) => return Ok(()),
                Ok(other) => tracing::debug!("Ignoring unexpected frame: {:?}", other),
                Err(e) => tracing::debug!("Ignoring undecodable message: {}", e),
            }
        }
    }
}

/// Read up to `buf.len()` bytes, stopping early only at end of file.
async fn read_full(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Send the file at `path` over the channel.
///
/// Returns the number of file bytes sent. Progress stays below 100 until the
/// receiver acknowledges; the reporter is only marked complete after `ACK`.
///
/// # Errors
///
/// Returns [`Error::Read`] if the file cannot be read (or shrinks while it is
/// sent), and [`Error::Transport`] if the channel fails or closes first.
pub async fn send_file(
    handle: &mut DataChannelHandle,
    path: &Path,
    metadata: &FileMetadata,
    config: &TransferConfig,
    reporter: &StatusReporter,
) -> Result<u64> {
    let display = path.display().to_string();
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::read(&display, e))?;

    wait_open(handle).await?;
    handle
        .channel
        .set_buffered_amount_low_threshold(config.buffered_low_threshold)
        .await;

    reporter.set_phase(Phase::Transferring);
    reporter.set_progress(0, 0, metadata.size);
    handle
        .channel
        .send(Frame::Metadata(metadata.clone()).encode()?)
        .await?;
    tracing::info!(
        "Sending '{}' ({} bytes, {})",
        metadata.name,
        metadata.size,
        metadata.mime_type
    );

    let total = metadata.size;
    let chunk_size = config.chunk_size.max(1);
    let mut sent: u64 = 0;
    let mut chunks = 0usize;

    while sent < total {
        let remaining = usize::try_from(total - sent).unwrap_or(usize::MAX);
        let mut buf = vec![0u8; chunk_size.min(remaining)];
        let n = read_full(&mut file, &mut buf)
            .await
            .map_err(|e| Error::read(&display, e))?;
        if n == 0 {
            return Err(Error::read(
                &display,
                format!("file ended after {sent} of {total} bytes"),
            ));
        }
        buf.truncate(n);

        wait_for_drain(handle, config.buffered_low_threshold).await?;
        handle
            .channel
            .send(ChannelMessage::Binary(Bytes::from(buf)))
            .await?;

        sent += n as u64;
        chunks += 1;
        reporter.set_progress(percent(sent, total, true), sent, total);
    }

    tracing::debug!("Sent {} chunks, waiting for acknowledgement", chunks);
    wait_for_ack(handle).await?;

    reporter.complete();
    tracing::info!("Transfer of '{}' acknowledged", metadata.name);
    Ok(sent)
}

struct Incoming {
    metadata: FileMetadata,
    chunks: Vec<Bytes>,
    received: u64,
}

/// Receive one file from the channel.
///
/// Once the bytes received reach the announced size, the chunks are
/// concatenated, exactly one `ACK` is sent and the reporter is marked
/// complete. An announced size of zero completes on the metadata frame.
///
/// # Errors
///
/// Returns [`Error::Protocol`] on out-of-order frames and
/// [`Error::Transport`] if the channel closes before the file is complete.
pub async fn receive_file(
    handle: &mut DataChannelHandle,
    reporter: &StatusReporter,
) -> Result<ReceivedFile> {
    let mut incoming: Option<Incoming> = None;

    loop {
        let ChannelEvent::Message(message) = next_event(handle, "file data").await? else {
            continue;
        };

        match Frame::decode(message)? {
            Frame::Metadata(metadata) => {
                if incoming.is_some() {
                    return Err(Error::Protocol("metadata announced twice".into()));
                }
                tracing::info!(
                    "Receiving '{}' ({} bytes, {})",
                    metadata.name,
                    metadata.size,
                    metadata.mime_type
                );
                reporter.set_phase(Phase::Transferring);
                reporter.set_progress(0, 0, metadata.size);
                incoming = Some(Incoming {
                    metadata,
                    chunks: Vec::new(),
                    received: 0,
                });
            }
            Frame::Chunk(data) => {
                let Some(current) = incoming.as_mut() else {
                    return Err(Error::Protocol("chunk received before metadata".into()));
                };
                current.received += data.len() as u64;
                current.chunks.push(data);
                let total = current.metadata.size;
                reporter.set_progress(
                    percent(current.received, total, true),
                    current.received,
                    total,
                );
            }
            Frame::Ack => {
                tracing::debug!("Ignoring acknowledgement on the receiving side");
                continue;
            }
        }

        if let Some(current) = incoming.take_if(|c| c.received >= c.metadata.size) {
            return finish(handle, reporter, current).await;
        }
    }
}

async fn finish(
    handle: &DataChannelHandle,
    reporter: &StatusReporter,
    incoming: Incoming,
) -> Result<ReceivedFile> {
    let Incoming {
        metadata,
        chunks,
        received,
    } = incoming;

    if received > metadata.size {
        tracing::warn!(
            "Received {} bytes, {} more than announced",
            received,
            received - metadata.size
        );
    }

    let mut data = BytesMut::with_capacity(usize::try_from(received).unwrap_or_default());
    for chunk in chunks {
        data.extend_from_slice(&chunk);
    }

    handle.channel.send(Frame::Ack.encode()?).await?;
    reporter.set_progress(100, received, metadata.size);
    reporter.complete();
    tracing::info!("Received '{}' ({} bytes)", metadata.name, received);

    Ok(ReceivedFile {
        metadata,
        data: data.freeze(),
    })
}
