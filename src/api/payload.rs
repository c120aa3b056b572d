//! Streams a request payload into a blocking `Read`
//!
//! The store API is synchronous and runs on the blocking pool, while the
//! payload can only be polled on the request task. Chunks cross over a
//! bounded channel, so at most `UPLOAD_QUEUE_DEPTH` chunks are buffered no
//! matter how large the upload is.

use actix_web::web;
use bytes::{Buf, Bytes};
use futures::StreamExt;
use log::warn;
use std::io::{self, Read};
use tokio::sync::mpsc;

use crate::error::VfsError;

pub const UPLOAD_QUEUE_DEPTH: usize = 8;

/// Blocking reader over chunks sent from the request task.
///
/// Must be read off the async runtime (`web::block`). A closed channel is
/// end of input; an error chunk aborts the read.
pub struct ChannelReader {
    receiver: mpsc::Receiver<io::Result<Bytes>>,
    current: Bytes,
}

impl ChannelReader {
    pub fn new(receiver: mpsc::Receiver<io::Result<Bytes>>) -> Self {
        Self {
            receiver,
            current: Bytes::new(),
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.current.is_empty() {
            match self.receiver.blocking_recv() {
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(e)) => return Err(e),
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }
}

/// Forward `payload` chunks to `sender`, enforcing `max_size`.
///
/// On a payload error or an oversize body the reader is sent an error so the
/// store discards the partial object, and the matching validation error is
/// returned. Stops quietly if the reader has gone away.
pub async fn pump_payload(
    mut payload: web::Payload,
    sender: mpsc::Sender<io::Result<Bytes>>,
    max_size: usize,
) -> Result<u64, VfsError> {
    let mut total = 0usize;

    while let Some(chunk) = payload.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Error reading upload payload: {}", e);
                let message = format!("Error reading payload: {}", e);
                let _ = sender
                    .send(Err(io::Error::new(io::ErrorKind::UnexpectedEof, message.clone())))
                    .await;
                return Err(VfsError::validation(message));
            }
        };

        total += chunk.len();
        if total > max_size {
            let message = format!("Upload exceeds {} bytes", max_size);
            let _ = sender
                .send(Err(io::Error::new(io::ErrorKind::InvalidData, message.clone())))
                .await;
            return Err(VfsError::validation(message));
        }

        if sender.send(Ok(chunk)).await.is_err() {
            break;
        }
    }

    Ok(total as u64)
}
