//! Frame I/O over a byte stream
//!
//! Receiving reads the header byte, then the remaining-length field one byte
//! at a time, then exactly `remaining length` body bytes. Any short read
//! fails the whole receive.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::constants::COMMAND_MASK;
use super::packet::{Packet, RemainingLength};
use crate::error::Result;

/// Read one frame
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet>
where
    R: AsyncRead + Unpin,
{
    let header = reader.read_u8().await?;

    let mut length = RemainingLength::new();
    let remaining = loop {
        let byte = reader.read_u8().await?;
        if let Some(value) = length.push(byte)? {
            break value;
        }
    };

    let body = if remaining > 0 {
        let mut body = vec![0u8; remaining];
        reader.read_exact(&mut body).await?;
        Bytes::from(body)
    } else {
        Bytes::new()
    };

    Ok(Packet::new(header & COMMAND_MASK, body))
}

/// Write one frame fully
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    packet.encode(&mut buf)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
