use crate::Dispatcher;
use micro_api_http::connection::HttpConnection;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

pub struct ServerBuilder {
    dispatcher: Option<Dispatcher>,
    address: Option<io::Result<Vec<SocketAddr>>>,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { dispatcher: None, address: None }
    }

    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = Some(address.to_socket_addrs().map(Iterator::collect));
        self
    }

    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let dispatcher = self.dispatcher.ok_or(ServerBuildError::MissingDispatcher)?;
        let address = self
            .address
            .ok_or(ServerBuildError::MissingAddress)?
            .map_err(|e| ServerBuildError::InvalidAddress { reason: e.to_string() })?;
        if address.is_empty() {
            return Err(ServerBuildError::InvalidAddress { reason: "address resolves to nothing".to_owned() });
        }
        Ok(Server { dispatcher: Arc::new(dispatcher), address })
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("dispatcher", &self.dispatcher.is_some())
            .field("address", &self.address)
            .finish()
    }
}

#[derive(Debug)]
pub struct Server {
    dispatcher: Arc<Dispatcher>,
    address: Vec<SocketAddr>,
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("dispatcher must be set")]
    MissingDispatcher,
    #[error("address must be set")]
    MissingAddress,
    #[error("invalid address: {reason}")]
    InvalidAddress { reason: String },
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn address(&self) -> &[SocketAddr] {
        &self.address
    }

    /// Binds the configured address and serves until the process ends.
    pub async fn start(self) -> io::Result<()> {
        info!("start listening at {:?}", self.address);
        let tcp_listener = match TcpListener::bind(self.address.as_slice()).await {
            Ok(tcp_listener) => tcp_listener,
            Err(e) => {
                error!(cause = %e, "bind server error");
                return Err(e);
            }
        };

        self.serve(tcp_listener).await;
        Ok(())
    }

    /// Serves connections accepted from `tcp_listener`.
    pub async fn serve(self, tcp_listener: TcpListener) {
        let dispatcher = self.dispatcher;
        loop {
            let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let dispatcher = Arc::clone(&dispatcher);

            tokio::spawn(async move {
                let (reader, writer) = tcp_stream.into_split();
                let connection = HttpConnection::new(reader, writer);
                match connection.process(dispatcher).await {
                    Ok(()) => {
                        debug!(%remote_addr, "finished process, connection shutdown");
                    }
                    Err(e) => {
                        error!(%remote_addr, "service has error, cause {}, connection shutdown", e);
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::router::{HandlerRef, RouteTable};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn dispatcher() -> Dispatcher {
        let mut table = RouteTable::new();
        table
            .get(
                "/users/:id",
                HandlerRef::bound(handler_fn(|req, resp| {
                    resp.success(json!({ "id": req.path_param("id") }), "User retrieved")?;
                    Ok(())
                })),
                &[],
            )
            .unwrap();
        Dispatcher::builder(table).build()
    }

    #[test]
    fn build_requires_dispatcher_and_address() {
        assert!(matches!(Server::builder().address("127.0.0.1:0").build(), Err(ServerBuildError::MissingDispatcher)));
        assert!(matches!(Server::builder().dispatcher(dispatcher()).build(), Err(ServerBuildError::MissingAddress)));
        assert!(matches!(
            Server::builder().dispatcher(dispatcher()).address("not an address").build(),
            Err(ServerBuildError::InvalidAddress { .. })
        ));

        let server = Server::builder().dispatcher(dispatcher()).address("127.0.0.1:8080").build().unwrap();
        assert_eq!(server.address(), ["127.0.0.1:8080".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn serves_requests_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local_addr = listener.local_addr().unwrap();
        let server = Server::builder().dispatcher(dispatcher()).address(local_addr).build().unwrap();
        tokio::spawn(server.serve(listener));

        let mut stream = TcpStream::connect(local_addr).await.unwrap();
        stream.write_all(b"GET /users/42 HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await.unwrap();

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8(raw).unwrap();

        assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"), "{raw}");
        assert!(raw.contains("content-type: application/json\r\n"), "{raw}");
        assert!(raw.ends_with(r#"{"data":{"id":"42"},"message":"User retrieved"}"#), "{raw}");
    }
}
