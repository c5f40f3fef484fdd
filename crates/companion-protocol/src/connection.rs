//! Stream framing over Unix-domain sockets.

use bincode::{Decode, Encode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::trace;

use crate::error::ProtocolError;
use crate::wire::{decode_message, encode_message, MAX_MESSAGE_SIZE};

/// Split a connected socket into a framed sender and receiver.
pub fn split(
    stream: UnixStream,
) -> (MessageSender<OwnedWriteHalf>, MessageReceiver<OwnedReadHalf>) {
    let (read, write) = stream.into_split();
    (MessageSender::new(write), MessageReceiver::new(read))
}

/// Sends length-prefixed bincode messages over a byte stream.
pub struct MessageSender<W> {
    stream: W,
}

impl<W: AsyncWrite + Unpin> MessageSender<W> {
    pub fn new(stream: W) -> Self {
        Self { stream }
    }

    /// Send a message, encoding it as length-prefixed bincode.
    pub async fn send<T: Encode>(&mut self, msg: &T) -> Result<(), ProtocolError> {
        let frame = encode_message(msg)?;
        self.stream
            .write_all(&frame)
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;
        self.stream
            .flush()
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;

        trace!(len = frame.len() - 4, "sent message");
        Ok(())
    }

    /// Shut down the write side (signal no more data).
    pub async fn finish(mut self) -> Result<(), ProtocolError> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))
    }
}

/// Receives length-prefixed bincode messages from a byte stream.
pub struct MessageReceiver<R> {
    stream: R,
}

impl<R: AsyncRead + Unpin> MessageReceiver<R> {
    pub fn new(stream: R) -> Self {
        Self { stream }
    }

    /// Receive and decode a message.
    ///
    /// Returns `None` if the peer closed the stream between messages. Not
    /// cancel safe: a partially read frame is lost if the future is dropped.
    pub async fn recv<T: Decode<()>>(&mut self) -> Result<Option<T>, ProtocolError> {
        // Read 4-byte length prefix
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(ProtocolError::Connection(e.to_string())),
        }

        let len = u32::from_be_bytes(len_buf);
        if len > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::Deserialization(format!(
                "message size {len} exceeds maximum {MAX_MESSAGE_SIZE}"
            )));
        }

        let mut payload = vec![0u8; len as usize];
        match self.stream.read_exact(&mut payload).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ProtocolError::StreamClosed);
            }
            Err(e) => return Err(ProtocolError::Connection(e.to_string())),
        }

        let msg = decode_message(&payload)?;
        trace!(len, "received message");
        Ok(Some(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_types::{CompanionMessage, FrontmostApplication};

    #[tokio::test]
    async fn framed_messages_cross_a_socket_pair() {
        let (a, b) = UnixStream::pair().unwrap();
        let (mut tx, _a_rx) = split(a);
        let (_b_tx, mut rx) = split(b);

        let first = CompanionMessage::FrontmostApplicationChanged(FrontmostApplication::new(
            "org.gnome.Terminal",
            "/usr/bin/gnome-terminal",
        ));
        tx.send(&first).await.unwrap();
        tx.send(&CompanionMessage::Bye).await.unwrap();

        assert_eq!(rx.recv::<CompanionMessage>().await.unwrap(), Some(first));
        assert_eq!(
            rx.recv::<CompanionMessage>().await.unwrap(),
            Some(CompanionMessage::Bye)
        );
    }

    #[tokio::test]
    async fn clean_close_between_frames_is_none() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(a);
        let mut rx = MessageReceiver::new(b);
        assert!(rx.recv::<CompanionMessage>().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_inside_a_frame_is_an_error() {
        let (mut a, b) = UnixStream::pair().unwrap();
        a.write_all(&16u32.to_be_bytes()).await.unwrap();
        a.write_all(&[1, 2, 3]).await.unwrap();
        drop(a);
        let mut rx = MessageReceiver::new(b);
        assert!(matches!(
            rx.recv::<CompanionMessage>().await,
            Err(ProtocolError::StreamClosed)
        ));
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut a, b) = UnixStream::pair().unwrap();
        a.write_all(&(MAX_MESSAGE_SIZE + 1).to_be_bytes()).await.unwrap();
        let mut rx = MessageReceiver::new(b);
        assert!(matches!(
            rx.recv::<CompanionMessage>().await,
            Err(ProtocolError::Deserialization(_))
        ));
    }
}
