//local shortcuts

//third-party shortcuts
use futures_util::{SinkExt, StreamExt};
use simplehub::*;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};

//standard shortcuts
use std::time::Duration;

//-------------------------------------------------------------------------------------------------------------------

pub type RawSocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

//-------------------------------------------------------------------------------------------------------------------

/// Server config with short timers so liveness/shutdown scenarios finish quickly.
pub fn fast_server_config() -> ServerConfig
{
    ServerConfig{
            heartbeat_interval        : Duration::from_millis(50),
            heartbeat_timeout         : Duration::from_millis(200),
            graceful_shutdown_timeout : Duration::from_millis(300),
            ..Default::default()
        }
}

pub fn make_store(records: &[(&str, &str)]) -> CredentialStore
{
    let mut store = CredentialStore::new();
    for (name, token) in records
    {
        store.set_user(*name, *token);
    }
    store
}

pub async fn start_server(records: &[(&str, &str)]) -> Server
{
    start_server_with(records, fast_server_config()).await
}

pub async fn start_server_with(records: &[(&str, &str)], config: ServerConfig) -> Server
{
    Server::start("127.0.0.1:0", make_store(records), config).await.unwrap()
}

pub fn client_config(server: &Server, token: &str) -> ClientConfig
{
    let mut config = ClientConfig::new(server.url().as_str(), token);
    config.heartbeat_interval = Duration::from_millis(50);
    config
}

pub async fn connect_client(server: &Server, token: &str) -> Client
{
    Client::connect(client_config(server, token)).await.unwrap()
}

//-------------------------------------------------------------------------------------------------------------------

/// What a raw protocol probe observed on the wire.
#[derive(Debug)]
pub enum RawEvent
{
    Frame(Frame),
    Closed
    {
        code: Option<u16>,
        reason: String,
    },
}

pub async fn raw_connect(server: &Server) -> RawSocket
{
    let (socket, _response) = tokio_tungstenite::connect_async(server.url().as_str()).await.unwrap();
    socket
}

pub async fn raw_send(socket: &mut RawSocket, frame: &Frame)
{
    socket.send(Message::Text(Utf8Bytes::from(frame.encode().unwrap()))).await.unwrap();
}

pub async fn raw_send_text(socket: &mut RawSocket, text: &str)
{
    socket.send(Message::Text(Utf8Bytes::from(text.to_owned()))).await.unwrap();
}

/// Next frame or closure observed by the probe, skipping transport ping/pong. Panics after 5 seconds.
pub async fn raw_next(socket: &mut RawSocket) -> RawEvent
{
    tokio::time::timeout(Duration::from_secs(5), async
    {
        loop
        {
            match socket.next().await
            {
                Some(Ok(Message::Text(text))) =>
                {
                    return RawEvent::Frame(Frame::decode(text.as_str()).unwrap());
                }
                Some(Ok(Message::Close(frame))) =>
                {
                    let (code, reason) = match frame
                    {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                        None        => (None, String::new()),
                    };
                    return RawEvent::Closed{ code, reason };
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return RawEvent::Closed{ code: None, reason: String::new() },
            }
        }
    })
    .await
    .expect("timed out waiting for a frame")
}

/// Like [`raw_next`] but also skips heartbeat probes.
pub async fn raw_next_non_heartbeat(socket: &mut RawSocket) -> RawEvent
{
    loop
    {
        match raw_next(socket).await
        {
            RawEvent::Frame(Frame::Heartbeat) => continue,
            event => return event,
        }
    }
}

/// Asserts the probe observes nothing but heartbeats for `window`.
pub async fn raw_expect_silence(socket: &mut RawSocket, window: Duration)
{
    if let Ok(event) = tokio::time::timeout(window, raw_next_non_heartbeat(socket)).await
    {
        panic!("expected silence, received {:?}", event);
    }
}

/// Authenticates a raw probe and returns the canonical name from `auth_success`.
pub async fn raw_authenticate(socket: &mut RawSocket, token: &str, name: Option<&str>) -> String
{
    raw_send(socket, &Frame::Auth{ token: token.into(), name: name.map(String::from) }).await;
    match raw_next_non_heartbeat(socket).await
    {
        RawEvent::Frame(Frame::AuthSuccess{ name }) => name,
        other => panic!("expected auth_success, received {:?}", other),
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Waits until the server emits `expected`, skipping other notifications. Panics after 5 seconds.
pub async fn expect_server_notification(server: &Server, expected: ServerNotification)
{
    tokio::time::timeout(Duration::from_secs(5), async
    {
        loop
        {
            match server.next_notification().await
            {
                Some(notification) if notification == expected => return,
                Some(_) => continue,
                None => panic!("server notification stream ended while waiting for {:?}", expected),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for server notification {:?}", expected))
}

/// Waits until the client emits `expected`, skipping other notifications. Panics after 5 seconds.
pub async fn expect_client_notification(client: &Client, expected: ClientNotification)
{
    tokio::time::timeout(Duration::from_secs(5), async
    {
        loop
        {
            match client.next_notification().await
            {
                Some(notification) if notification == expected => return,
                Some(_) => continue,
                None => panic!("client notification stream ended while waiting for {:?}", expected),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for client notification {:?}", expected))
}

//-------------------------------------------------------------------------------------------------------------------
