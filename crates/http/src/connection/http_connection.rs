use std::error::Error;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::{Response, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::handler::Handler;
use crate::protocol::{HttpError, keep_alive};

use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info};

/// An HTTP connection that manages request processing and response writing
///
/// `HttpConnection` handles the full lifecycle of an HTTP connection:
/// - Reading and decoding complete requests
/// - Handing each request to a [`Handler`]
/// - Writing the response back
/// - Keeping the connection open while both sides agree to
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
#[derive(Debug)]
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), 8 * 1024),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
        }
    }

    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
    {
        loop {
            match self.framed_read.next().await {
                Some(Ok(request)) => {
                    let persistent = keep_alive(request.version(), request.headers());
                    let response = match handler.call(request).await {
                        Ok(response) => response,
                        Err(e) => {
                            let e: Box<dyn Error + Send + Sync> = e.into();
                            error!("handle response error, cause: {}", e);
                            build_error_response(StatusCode::INTERNAL_SERVER_ERROR)
                        }
                    };

                    self.framed_write.send(response).await?;

                    if !persistent {
                        debug!("connection is not persistent, close after response");
                        return Ok(());
                    }
                }

                Some(Err(e)) => {
                    error!("can't receive next request, cause {}", e);
                    let error_response = build_error_response(StatusCode::BAD_REQUEST);
                    self.framed_write.send(error_response).await?;
                    return Err(e.into());
                }

                None => {
                    info!("cant read more request, break this connection down");
                    return Ok(());
                }
            }
        }
    }
}

fn build_error_response(status_code: StatusCode) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status_code;
    response
}
