use bytes::BytesMut;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::{
    application::{
        dto::{PublishRequest, SubscribeRequest},
        use_cases::*,
    },
    domain::services::BrokerService,
    infrastructure::{
        config::ServerConfig,
        protocol::{
            encode_payload, read_frame, write_frame, ApiKey, ErrorCode, PublishReply,
            RequestHeader, ResponseHeader, StreamFrame, WireDecodable, WireEncodable,
        },
    },
};

/// Broker server that handles TCP connections
pub struct BrokerServer {
    config: ServerConfig,
    publish_use_case: Arc<PublishUseCase>,
    subscribe_use_case: Arc<SubscribeUseCase>,
}

impl BrokerServer {
    pub fn new(config: ServerConfig, broker: Arc<BrokerService>) -> Self {
        Self {
            config,
            publish_use_case: Arc::new(PublishUseCase::new(broker.clone())),
            subscribe_use_case: Arc::new(SubscribeUseCase::new(broker)),
        }
    }

    /// Bind the configured address and serve until `shutdown` fires
    pub async fn start(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.address()).await?;
        self.serve(listener, shutdown).await
    }

    /// Accept connections on `listener` until `shutdown` fires.
    ///
    /// Open subscriptions are cancelled with the same token and end with a
    /// `Cancelled` frame.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!("Broker server listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutting down broker server");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("New connection from: {}", addr);
                        let handler = ConnectionHandler {
                            stream,
                            max_frame_size: self.config.max_frame_size,
                            publish_use_case: self.publish_use_case.clone(),
                            subscribe_use_case: self.subscribe_use_case.clone(),
                            shutdown: shutdown.child_token(),
                        };
                        tokio::spawn(async move {
                            if let Err(e) = handler.handle().await {
                                error!("Connection error from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
        }

        Ok(())
    }
}

/// Handles individual client connections
struct ConnectionHandler {
    stream: TcpStream,
    max_frame_size: usize,
    publish_use_case: Arc<PublishUseCase>,
    subscribe_use_case: Arc<SubscribeUseCase>,
    shutdown: CancellationToken,
}

impl ConnectionHandler {
    /// Serve requests until the client disconnects or a subscription ends
    async fn handle(mut self) -> anyhow::Result<()> {
        loop {
            let frame = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                frame = read_frame(&mut self.stream, self.max_frame_size) => frame?,
            };
            let Some(mut buf) = frame else {
                debug!("Client disconnected");
                break;
            };
            let correlation_id = RequestHeader::peek_correlation_id(&buf);

            let header = match RequestHeader::decode(&mut buf) {
                Ok(header) => header,
                Err(e) => {
                    warn!("Closing connection after malformed request header: {}", e);
                    if let Some(correlation_id) = correlation_id {
                        self.send(correlation_id, &ErrorCode::Unknown).await?;
                    }
                    break;
                }
            };
            debug!(
                "Processing {:?} request (correlation_id: {})",
                header.api_key, header.correlation_id
            );

            match header.api_key {
                ApiKey::Publish => self.handle_publish(&header, &mut buf).await?,
                ApiKey::Health => self.handle_health(&header).await?,
                ApiKey::Subscribe => {
                    // The connection belongs to the stream from here on
                    return self.handle_subscribe(&header, &mut buf).await;
                }
            }
        }

        Ok(())
    }

    async fn handle_publish(&mut self, header: &RequestHeader, buf: &mut BytesMut) -> anyhow::Result<()> {
        let reply = match PublishRequest::decode(buf) {
            Ok(request) => match self.publish_use_case.execute(request).await {
                Ok(response) => {
                    debug!("Message stored as {}", response.id);
                    PublishReply::Accepted(response)
                }
                Err(e) => {
                    warn!("Failed to store message: {}", e);
                    PublishReply::Rejected(ErrorCode::from(&e))
                }
            },
            Err(e) => {
                error!("Failed to decode publish request: {}", e);
                PublishReply::Rejected(ErrorCode::Unknown)
            }
        };

        self.send(header.correlation_id, &reply).await
    }

    async fn handle_health(&mut self, header: &RequestHeader) -> anyhow::Result<()> {
        self.send(header.correlation_id, &ErrorCode::None).await
    }

    /// Stream a subscription until it ends, the client hangs up or the server
    /// shuts down. Always finishes with an `End` frame when the client is
    /// still there to read it.
    async fn handle_subscribe(mut self, header: &RequestHeader, buf: &mut BytesMut) -> anyhow::Result<()> {
        let request = match SubscribeRequest::decode(buf) {
            Ok(request) => request,
            Err(e) => {
                error!("Failed to decode subscribe request: {}", e);
                return self.send(header.correlation_id, &StreamFrame::End(ErrorCode::Unknown)).await;
            }
        };

        let cancel = self.shutdown.child_token();
        let mut subscription = match self.subscribe_use_case.execute(request, cancel.clone()).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!("Subscribe failed: {}", e);
                return self.send(header.correlation_id, &StreamFrame::End(ErrorCode::from(&e))).await;
            }
        };

        let opened = StreamFrame::Opened {
            consumer_id: subscription.consumer().id.0,
        };
        self.send(header.correlation_id, &opened).await?;

        let response_header = ResponseHeader {
            correlation_id: header.correlation_id,
        };
        let (mut reader, mut writer) = self.stream.split();
        let mut probe = [0u8; 1];

        loop {
            let frame = tokio::select! {
                item = subscription.next() => match item {
                    Some(Ok(message)) => StreamFrame::Message(message.into()),
                    Some(Err(e)) => StreamFrame::End(ErrorCode::from(&e)),
                    None => StreamFrame::End(ErrorCode::Cancelled),
                },
                // Clients send nothing while streaming; any read outcome means
                // they hung up or broke protocol
                _ = reader.read(&mut probe) => {
                    debug!("{} disconnected mid-stream", subscription.consumer().id);
                    cancel.cancel();
                    break;
                }
            };

            let done = matches!(frame, StreamFrame::End(_));
            let payload = encode_payload(&response_header, &frame)?;
            // A client that stops reading must not pin the subscription past
            // cancellation. A frame that fits the socket buffer still goes out.
            tokio::select! {
                biased;
                written = write_frame(&mut writer, &payload) => written?,
                _ = cancel.cancelled() => {
                    warn!(
                        "{} stopped reading, dropping its subscription to {}",
                        subscription.consumer().id,
                        subscription.topic()
                    );
                    break;
                }
            }
            if done {
                break;
            }
        }

        Ok(())
    }

    async fn send(&mut self, correlation_id: i32, body: &impl WireEncodable) -> anyhow::Result<()> {
        let response_header = ResponseHeader { correlation_id };
        let payload = encode_payload(&response_header, body)?;
        write_frame(&mut self.stream, &payload).await?;
        debug!("Sent response ({} bytes)", payload.len());
        Ok(())
    }
}
