use anyhow::Result;
use clap::Parser;
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use localhosted_common::{
    Message, TunnelError, TunnelRequest, TunnelResponse,
    constants::{RECONNECT_MAX_DELAY_MS, RECONNECT_MIN_DELAY_MS, RECONNECT_MULTIPLIER},
    decode_body, encode_body, headers_to_map, map_to_headers,
};
use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
};
use tracing::{debug, error, info, warn};

type WebSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// CLI arguments for the forwarder agent
#[derive(Parser, Debug)]
#[command(name = "lhf")]
#[command(about = "LocalHosted forwarder agent", long_about = None)]
#[command(version)]
struct Args {
    /// Local port to forward requests to
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Local host address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Relay control-channel endpoint
    #[arg(
        short,
        long,
        env = "LOCALHOSTED_ENDPOINT",
        default_value = "ws://localhost:8080/tunnel"
    )]
    endpoint: String,

    /// Requested subdomain (a random one is assigned when omitted)
    #[arg(short, long)]
    subdomain: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Handshake timeout in seconds
    #[arg(long, default_value = "10")]
    connect_timeout: u64,

    /// Timeout for requests against the local service, in seconds
    #[arg(long, default_value = "30")]
    request_timeout: u64,
}

/// Configuration for the forwarder
#[derive(Debug, Clone)]
pub struct Config {
    /// Local service address (e.g., "http://127.0.0.1:3000")
    pub local_address: String,

    /// Relay endpoint URL
    pub endpoint: String,

    /// Requested subdomain hint
    pub subdomain: Option<String>,

    /// Local port reported to the relay
    pub local_port: u16,

    /// Handshake timeout
    pub connect_timeout: Duration,

    /// Request timeout when calling the local service
    pub request_timeout: Duration,

    /// Reconnection strategy
    pub reconnect: ReconnectConfig,
}

/// Reconnection configuration with exponential backoff
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Config {
    fn from_args(args: Args) -> Self {
        Self {
            local_address: format!("http://{}:{}", args.host, args.port),
            endpoint: args.endpoint,
            subdomain: args.subdomain,
            local_port: args.port,
            connect_timeout: Duration::from_secs(args.connect_timeout),
            request_timeout: Duration::from_secs(args.request_timeout),
            reconnect: ReconnectConfig {
                min_delay: Duration::from_millis(RECONNECT_MIN_DELAY_MS),
                max_delay: Duration::from_millis(RECONNECT_MAX_DELAY_MS),
                multiplier: RECONNECT_MULTIPLIER,
            },
        }
    }
}

/// Connection manager handles the channel lifecycle and reconnection
pub struct ConnectionManager {
    config: Config,
}

impl ConnectionManager {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Main run loop with automatic reconnection
    pub async fn run(&self) -> Result<()> {
        let mut reconnect_delay = self.config.reconnect.min_delay;
        let mut attempt = 0;

        loop {
            match self.establish_connection().await {
                Ok((ws_stream, public_url)) => {
                    info!("Tunnel established: {}", public_url);
                    reconnect_delay = self.config.reconnect.min_delay;
                    attempt = 0;

                    // Handle the connection until it drops
                    if let Err(e) = self.handle_connection(ws_stream).await {
                        error!("Connection error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Failed to connect: {}", e);
                }
            }

            attempt += 1;
            info!(
                "Reconnecting in {:?} (attempt {})",
                reconnect_delay, attempt
            );
            tokio::time::sleep(reconnect_delay).await;

            // Exponential backoff
            reconnect_delay = Duration::from_millis(
                ((reconnect_delay.as_millis() as f64 * self.config.reconnect.multiplier)
                    .min(self.config.reconnect.max_delay.as_millis() as f64))
                    as u64,
            );
        }
    }

    /// Connect, send the register frame, and wait for tunnel-ready
    async fn establish_connection(&self) -> Result<(WebSocket, String)> {
        use tokio_tungstenite::tungstenite::client::IntoClientRequest;
        use tokio_tungstenite::tungstenite::http::HeaderValue;

        debug!("Connecting to {}", self.config.endpoint);

        let mut request = self
            .config
            .endpoint
            .clone()
            .into_client_request()
            .map_err(|e| TunnelError::Http(format!("Invalid endpoint URL: {}", e)))?;

        // Advisory hints, read by the relay once at upgrade time
        if let Some(ref subdomain) = self.config.subdomain {
            request.headers_mut().insert(
                "X-Subdomain",
                HeaderValue::from_str(subdomain)
                    .map_err(|e| TunnelError::Http(format!("Invalid subdomain: {}", e)))?,
            );
        }
        request.headers_mut().insert(
            "X-Local-Port",
            HeaderValue::from_str(&self.config.local_port.to_string())
                .map_err(|e| TunnelError::Http(e.to_string()))?,
        );

        let (mut ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| TunnelError::Http(format!("WebSocket connect failed: {}", e)))?;

        debug!("Channel open, sending register frame");

        let register = Message::Register {
            subdomain: self.config.subdomain.clone(),
        };
        let register_json = serde_json::to_string(&register).map_err(TunnelError::from)?;
        ws_stream
            .send(WsMessage::Text(register_json.into()))
            .await
            .map_err(|e| TunnelError::FrameSendFailed(e.to_string()))?;

        // Wait for the tunnel-ready frame
        let handshake = tokio::time::timeout(self.config.connect_timeout, async {
            while let Some(message) = ws_stream.next().await {
                match message {
                    Ok(WsMessage::Text(text)) => {
                        if let Ok(Message::TunnelReady { url, subdomain, id }) =
                            serde_json::from_str::<Message>(&text)
                        {
                            info!("Registered as '{}' (tunnel id {})", subdomain, id);
                            return Ok(url);
                        }
                    }
                    Ok(WsMessage::Close(_)) => {
                        return Err(TunnelError::TunnelDisconnected(
                            "relay closed the channel during the handshake".to_string(),
                        ));
                    }
                    Err(e) => {
                        return Err(TunnelError::Http(e.to_string()));
                    }
                    _ => {}
                }
            }
            Err(TunnelError::TunnelDisconnected(
                "channel closed before tunnel-ready".to_string(),
            ))
        });

        let public_url = handshake
            .await
            .map_err(|_| TunnelError::RequestTimeout("handshake".to_string()))??;

        println!("\n  Tunnel ready: {}", public_url);
        println!("  Forwarding to {}\n", self.config.local_address);

        Ok((ws_stream, public_url))
    }

    /// Drive one live connection with split read/write tasks
    async fn handle_connection(&self, ws_stream: WebSocket) -> Result<()> {
        let (write, read) = ws_stream.split();

        let (outgoing_tx, outgoing_rx) = mpsc::channel(100);

        let write_handle = tokio::spawn(write_task(write, outgoing_rx));
        let read_handle = tokio::spawn(read_task(
            read,
            outgoing_tx.clone(),
            self.config.local_address.clone(),
            self.config.request_timeout,
        ));

        // Either task ending means the connection dropped
        tokio::select! {
            result = write_handle => {
                warn!("Write task ended: {:?}", result);
            }
            result = read_handle => {
                warn!("Read task ended: {:?}", result);
            }
        }

        Ok(())
    }
}

/// Write task: the only task touching the socket sink
async fn write_task(
    mut write: SplitSink<WebSocket, WsMessage>,
    mut outgoing_rx: mpsc::Receiver<WsMessage>,
) -> Result<()> {
    while let Some(message) = outgoing_rx.recv().await {
        if let Err(e) = write.send(message).await {
            error!("Failed to send message: {}", e);
            break;
        }
    }

    debug!("Write task exiting");
    Ok(())
}

/// Read task: receives frames from the relay and dispatches them
async fn read_task(
    mut read: SplitStream<WebSocket>,
    outgoing_tx: mpsc::Sender<WsMessage>,
    local_address: String,
    request_timeout: Duration,
) -> Result<()> {
    while let Some(message) = read.next().await {
        match message {
            Ok(WsMessage::Text(text)) => {
                if let Err(e) =
                    handle_frame(&text, &outgoing_tx, &local_address, request_timeout).await
                {
                    error!("Error handling frame: {}", e);
                }
            }
            Ok(WsMessage::Binary(_)) => {
                warn!("Received unexpected binary message");
            }
            Ok(WsMessage::Ping(data)) => {
                debug!("Received transport ping");
                if outgoing_tx.send(WsMessage::Pong(data)).await.is_err() {
                    break;
                }
            }
            Ok(WsMessage::Pong(_)) => {
                debug!("Received transport pong");
            }
            Ok(WsMessage::Close(frame)) => {
                info!("Relay closed the channel: {:?}", frame);
                break;
            }
            Err(e) => {
                error!("Channel error: {}", e);
                break;
            }
            _ => {}
        }
    }

    debug!("Read task exiting");
    Ok(())
}

/// Dispatch one inbound protocol frame
async fn handle_frame(
    text: &str,
    outgoing_tx: &mpsc::Sender<WsMessage>,
    local_address: &str,
    request_timeout: Duration,
) -> Result<()> {
    let message: Message = serde_json::from_str(text)
        .map_err(|e| TunnelError::InvalidMessage(format!("Failed to parse frame: {}", e)))?;

    match message {
        Message::Request { data } => {
            debug!("Received request: {} {}", data.method, data.path);

            // Handle each request concurrently
            let local_address = local_address.to_string();
            let outgoing_tx = outgoing_tx.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    handle_tunnel_request(data, &local_address, request_timeout, outgoing_tx).await
                {
                    error!("Failed to handle request: {}", e);
                }
            });
        }

        Message::Ping => {
            debug!("Heartbeat ping, replying pong");
            let pong = serde_json::to_string(&Message::Pong).map_err(TunnelError::from)?;
            outgoing_tx
                .send(WsMessage::Text(pong.into()))
                .await
                .map_err(|e| TunnelError::FrameSendFailed(e.to_string()))?;
        }

        Message::TunnelReady { url, .. } => {
            info!("Tunnel ready at {}", url);
        }

        Message::Error { message } => {
            warn!("Relay error notice: {}", message);
        }

        _ => {
            warn!("Received unexpected frame type");
        }
    }

    Ok(())
}

/// Replay one tunneled request against the local service and send the
/// response frame back. Local failures become a synthesized 502 response so
/// the public caller is answered either way.
async fn handle_tunnel_request(
    request: TunnelRequest,
    local_address: &str,
    timeout: Duration,
    outgoing_tx: mpsc::Sender<WsMessage>,
) -> localhosted_common::Result<()> {
    let request_id = request.id;

    let client = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TunnelError::Http(e.to_string()))?;

    let method = request
        .method
        .parse::<reqwest::Method>()
        .map_err(|_| TunnelError::InvalidMessage(format!("Bad HTTP method: {}", request.method)))?;
    let url = format!("{}{}", local_address, request.path);

    let body = decode_body(request.body.as_deref())
        .map_err(|e| TunnelError::InvalidMessage(format!("Failed to decode body: {}", e)))?;

    let mut req_builder = client
        .request(method, &url)
        .headers(map_to_headers(&request.headers));
    if !body.is_empty() {
        req_builder = req_builder.body(body);
    }

    let response = match req_builder.send().await {
        Ok(response) => {
            let status_code = response.status().as_u16();
            let headers = headers_to_map(response.headers());
            let body_bytes = response
                .bytes()
                .await
                .map_err(|e| TunnelError::Http(e.to_string()))?;

            debug!("Local response: {} ({} bytes)", status_code, body_bytes.len());

            TunnelResponse {
                id: request_id,
                status_code,
                headers,
                body: encode_body(&body_bytes),
            }
        }
        Err(e) => {
            error!("Local service error: {}", e);
            let message = format!("Local service unavailable: {}", e);
            let mut response = TunnelResponse::new(request_id, 502);
            response
                .headers
                .insert("content-type".to_string(), "text/plain".to_string());
            response.body = encode_body(message.as_bytes());
            response
        }
    };

    let frame = serde_json::to_string(&Message::Response { data: response })
        .map_err(TunnelError::from)?;
    outgoing_tx
        .send(WsMessage::Text(frame.into()))
        .await
        .map_err(|e| TunnelError::FrameSendFailed(e.to_string()))?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    info!("LocalHosted forwarder v{}", env!("CARGO_PKG_VERSION"));
    info!("Local service: {}:{}", args.host, args.port);
    info!("Relay endpoint: {}", args.endpoint);

    let config = Config::from_args(args);
    let manager = ConnectionManager::new(config);

    // Run until interrupted
    tokio::select! {
        result = manager.run() => {
            error!("Connection manager exited: {:?}", result);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
        }
    }

    Ok(())
}
