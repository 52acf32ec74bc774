//! Newline-delimited JSON channel over tokio I/O.
//!
//! One envelope per line. A reader task decodes incoming lines and hands
//! them to the registered handlers; a writer task drains an unbounded queue
//! of encoded lines. Both are local tasks, so the channel must be created
//! inside a `tokio::task::LocalSet`.
//!
//! An undecodable line is answered with an `INVALID_REQUEST` Error envelope
//! only when it was a request (it had a `method` member) carrying an id and
//! this endpoint serves requests. Malformed replies and anonymous garbage
//! are logged and dropped.

use std::rc::Rc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use super::{ClientChannel, HandlerSet, MessageHandler, ServerChannel};
use crate::codec;
use crate::envelope::{Envelope, Request, Response};
use crate::error::ChannelError;

/// A channel speaking newline-delimited JSON over a byte stream.
#[derive(Clone)]
pub struct StreamChannel {
    outgoing: mpsc::UnboundedSender<String>,
    handlers: Rc<HandlerSet>,
}

impl StreamChannel {
    /// Start the reader and writer tasks.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + 'static,
        W: AsyncWrite + Unpin + 'static,
    {
        let (outgoing, queue) = mpsc::unbounded_channel();
        let handlers = Rc::new(HandlerSet::default());

        tokio::task::spawn_local(write_loop(writer, queue));
        tokio::task::spawn_local(read_loop(
            BufReader::new(reader),
            Rc::clone(&handlers),
            outgoing.clone(),
        ));

        Self { outgoing, handlers }
    }

    /// Encode and enqueue any envelope.
    pub fn send_envelope(&self, envelope: Envelope) -> Result<(), ChannelError> {
        let line = codec::encode(&envelope).map_err(|e| ChannelError::Encode(e.to_string()))?;
        self.outgoing.send(line).map_err(|_| ChannelError::Closed)
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.outgoing.is_closed()
    }
}

async fn write_loop<W>(mut writer: W, mut queue: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(mut line) = queue.recv().await {
        line.push('\n');
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            tracing::warn!(error = %e, "Stream write failed, closing channel");
            break;
        }
        if let Err(e) = writer.flush().await {
            tracing::warn!(error = %e, "Stream flush failed, closing channel");
            break;
        }
    }
}

async fn read_loop<R>(reader: BufReader<R>, handlers: Rc<HandlerSet>, outgoing: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::debug!("Stream reached end of input");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Stream read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match codec::decode(&line) {
            Ok(envelope) => handlers.dispatch(envelope),
            Err(err) => {
                if !err.request {
                    tracing::error!(error = %err, id = ?err.id, "Dropping undecodable input");
                    continue;
                }
                tracing::error!(error = %err, id = ?err.id, "Undecodable request");
                if !handlers.serves_requests() {
                    continue;
                }
                let Some(reply) = err.to_response() else {
                    continue;
                };
                match codec::encode(&Envelope::Response(reply)) {
                    Ok(encoded) => {
                        if outgoing.send(encoded).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to encode decode error reply"),
                }
            }
        }
    }
}

impl ClientChannel for StreamChannel {
    fn send(&self, request: Request) -> Result<(), ChannelError> {
        self.send_envelope(Envelope::Request(request))
    }

    fn set_message_handler(&self, handler: MessageHandler<Response>) {
        self.handlers.add_response_handler(handler);
    }
}

impl ServerChannel for StreamChannel {
    fn send(&self, response: Response) -> Result<(), ChannelError> {
        self.send_envelope(Envelope::Response(response))
    }

    fn set_message_handler(&self, handler: MessageHandler<Request>) {
        self.handlers.add_request_handler(handler);
    }
}
