//! Headless storyboard client.
//!
//! Joins a page over the relay websocket and drives the same optimistic
//! session the editor runs: mutations build through `client::emit`, inbound
//! broadcasts merge through the session's idempotent path. Frames travel as
//! protobuf binary on the way out and are accepted as either binary or JSON
//! text on the way in.

use std::time::Duration;

use clap::{Parser, Subcommand};
use client::session::PageSession;
use client::{emit, parse};
use frames::{Frame, Status};
use futures_util::{SinkExt, StreamExt};
use scene::doc::{ElementKind, PartialElement};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("websocket connect failed: {0}")]
    WsConnect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket closed")]
    WsClosed,
    #[error("frame decode failed: {0}")]
    Decode(#[from] frames::CodecError),
    #[error("timed out waiting for websocket frame")]
    Timeout,
    #[error("server returned error for {syscall}: {message}")]
    ServerError { syscall: String, message: String },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid element kind: {0}")]
    InvalidKind(String),
    #[error("join reply carried no element snapshot")]
    MissingSnapshot,
}

#[derive(Parser, Debug)]
#[command(name = "storyboard-cli", about = "Storyboard relay websocket CLI")]
struct Cli {
    #[arg(long, env = "STORYBOARD_WS_URL", default_value = "ws://127.0.0.1:3000/api/ws")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Join a page and print every broadcast as it arrives.
    Watch { page_id: Uuid },
    /// Join a page and print its element snapshot.
    List { page_id: Uuid },
    /// Create an element with default geometry and payload.
    Add {
        page_id: Uuid,
        #[arg(long, default_value = "rectangle")]
        kind: String,
        #[arg(long, default_value_t = 0.0)]
        x: f64,
        #[arg(long, default_value_t = 0.0)]
        y: f64,
    },
    /// Move an element to an absolute position.
    Move {
        page_id: Uuid,
        element_id: Uuid,
        #[arg(long)]
        x: f64,
        #[arg(long)]
        y: f64,
    },
    /// Merge sparse fields into an element (JSON object).
    Update {
        page_id: Uuid,
        element_id: Uuid,
        #[arg(long)]
        data: String,
    },
    /// Delete an element.
    Delete { page_id: Uuid, element_id: Uuid },
    /// Replace a page's paint order.
    Reorder {
        page_id: Uuid,
        #[arg(required = true)]
        ids: Vec<Uuid>,
    },
    /// Move elements to another page (delete + recreate).
    MovePage {
        page_id: Uuid,
        to_page_id: Uuid,
        #[arg(required = true)]
        ids: Vec<Uuid>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Watch { page_id } => watch(&cli.url, page_id).await,
        Command::List { page_id } => list(&cli.url, page_id).await,
        Command::Add { page_id, kind, x, y } => {
            let kind = parse_kind(&kind)?;
            let (mut stream, mut session) = join(&cli.url, page_id).await?;
            let frames = session.create_element(kind, x, y);
            send_and_await(&mut stream, frames).await
        }
        Command::Move { page_id, element_id, x, y } => {
            let (mut stream, _) = join(&cli.url, page_id).await?;
            let frame = emit::element_move(page_id, element_id, x, y);
            send_and_await(&mut stream, vec![frame]).await
        }
        Command::Update { page_id, element_id, data } => {
            let fields: PartialElement = serde_json::from_str(&data)?;
            let (mut stream, _) = join(&cli.url, page_id).await?;
            let frame = emit::element_update(page_id, element_id, &fields);
            send_and_await(&mut stream, vec![frame]).await
        }
        Command::Delete { page_id, element_id } => {
            let (mut stream, _) = join(&cli.url, page_id).await?;
            let frame = emit::element_delete(page_id, element_id);
            send_and_await(&mut stream, vec![frame]).await
        }
        Command::Reorder { page_id, ids } => {
            let (mut stream, _) = join(&cli.url, page_id).await?;
            let frame = emit::element_reorder(page_id, &ids);
            send_and_await(&mut stream, vec![frame]).await
        }
        Command::MovePage { page_id, to_page_id, ids } => {
            let (mut stream, _) = join(&cli.url, page_id).await?;
            let id_list: Vec<Value> = ids.iter().map(|id| Value::String(id.to_string())).collect();
            let frame = Frame::request("element:move_page", frames::Data::new())
                .with_page_id(page_id)
                .with_data("to_page_id", to_page_id.to_string())
                .with_data("ids", id_list);
            send_and_await(&mut stream, vec![frame]).await
        }
    }
}

fn parse_kind(kind: &str) -> Result<ElementKind, CliError> {
    serde_json::from_value(Value::String(kind.to_owned())).map_err(|_| CliError::InvalidKind(kind.to_owned()))
}

// =============================================================================
// COMMANDS
// =============================================================================

async fn watch(url: &str, page_id: Uuid) -> Result<(), CliError> {
    let (mut stream, mut session) = join(url, page_id).await?;
    eprintln!("joined page {page_id} with {} elements; watching", session.engine.store.len());

    loop {
        let frame = next_frame(&mut stream, None).await?;
        session.apply_frame(&frame);
        println!(
            "{}",
            serde_json::to_string(&serde_json::json!({
                "syscall": frame.syscall,
                "data": frame.data,
                "elements": session.engine.store.len(),
            }))?
        );
    }
}

async fn list(url: &str, page_id: Uuid) -> Result<(), CliError> {
    let (_, session) = join(url, page_id).await?;
    let elements = session.engine.store.snapshot();
    println!("{}", serde_json::to_string_pretty(&elements)?);
    Ok(())
}

/// Connect, wait for the welcome, join the page, and hydrate a session
/// from the snapshot reply.
async fn join(url: &str, page_id: Uuid) -> Result<(WsStream, PageSession), CliError> {
    let (mut stream, _) = connect_async(url)
        .await
        .map_err(|error| CliError::WsConnect(Box::new(error)))?;

    // The relay greets every connection with session:connected.
    loop {
        let frame = next_frame(&mut stream, Some(REPLY_TIMEOUT)).await?;
        if frame.syscall == "session:connected" {
            break;
        }
    }

    let join = emit::page_join(page_id);
    let join_id = join.id;
    send_frame(&mut stream, &join).await?;
    let reply = await_terminal(&mut stream, join_id).await?;

    let (page, elements) = parse::join_snapshot(&reply).ok_or(CliError::MissingSnapshot)?;
    let mut session = PageSession::new();
    session.load(page, elements);
    Ok((stream, session))
}

async fn send_and_await(stream: &mut WsStream, frames: Vec<Frame>) -> Result<(), CliError> {
    for frame in frames {
        let frame_id = frame.id;
        let syscall = frame.syscall.clone();
        send_frame(stream, &frame).await?;
        let reply = await_terminal(stream, frame_id).await?;
        println!(
            "{}",
            serde_json::to_string(&serde_json::json!({
                "syscall": syscall,
                "status": reply.status,
                "data": reply.data,
            }))?
        );
    }
    Ok(())
}

// =============================================================================
// WIRE HELPERS
// =============================================================================

async fn send_frame(stream: &mut WsStream, frame: &Frame) -> Result<(), CliError> {
    stream
        .send(Message::Binary(frames::encode_frame(frame).into()))
        .await
        .map_err(|error| CliError::WsConnect(Box::new(error)))
}

/// Read frames until a terminal reply for `parent_id` arrives. Broadcasts
/// that interleave with the reply are skipped.
async fn await_terminal(stream: &mut WsStream, parent_id: Uuid) -> Result<Frame, CliError> {
    loop {
        let frame = next_frame(stream, Some(REPLY_TIMEOUT)).await?;
        if frame.parent_id != Some(parent_id) {
            continue;
        }
        if frame.status == Status::Error {
            let message = frame
                .data
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("-")
                .to_owned();
            return Err(CliError::ServerError { syscall: frame.syscall, message });
        }
        if frame.status.is_terminal() {
            return Ok(frame);
        }
    }
}

/// Pull the next frame off the socket, decoding binary via the frame codec
/// and text via JSON. Non-frame messages are skipped.
async fn next_frame(stream: &mut WsStream, timeout: Option<Duration>) -> Result<Frame, CliError> {
    loop {
        let message = match timeout {
            Some(limit) => tokio::time::timeout(limit, stream.next())
                .await
                .map_err(|_| CliError::Timeout)?,
            None => stream.next().await,
        };
        let Some(message) = message else {
            return Err(CliError::WsClosed);
        };
        let message = message.map_err(|error| CliError::WsConnect(Box::new(error)))?;
        match message {
            Message::Binary(bytes) => return Ok(frames::decode_frame(&bytes)?),
            Message::Text(text) => return Ok(serde_json::from_str(&text)?),
            Message::Close(_) => return Err(CliError::WsClosed),
            _ => {}
        }
    }
}
