//! Remote control over plain HTTP.
//!
//! Understands `GET /folder?folder=N`, `/play?track=N`, `/next`, `/prev`,
//! `/resume` and `/pause`. Every request, known or not, is answered with the
//! built-in control page.

use embedded_io_async::{Read, Write};
use log::{debug, info, warn};

use crate::player::{PlayerCommand, PlayerControl};
use crate::token::FolderIndex;
use crate::PrintErr;

pub const INDEX_HTML: &str = include_str!("../assets/index.html");

const RESPONSE_HEADER: &[u8] = b"HTTP/1.0 200 OK\r\nContent-type: text/html\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebCommand {
    Folder(FolderIndex),
    Track(u16),
    Next,
    Previous,
    Resume,
    Pause,
}

impl From<WebCommand> for PlayerCommand {
    fn from(command: WebCommand) -> Self {
        match command {
            WebCommand::Folder(folder) => PlayerCommand::PlayFolder(folder),
            WebCommand::Track(track) => PlayerCommand::PlayTrack(track),
            WebCommand::Next => PlayerCommand::Next,
            WebCommand::Previous => PlayerCommand::Previous,
            WebCommand::Resume => PlayerCommand::Resume,
            WebCommand::Pause => PlayerCommand::Pause,
        }
    }
}

/// Value of `key` in a `a=1&b=2` query string.
fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

/// Numeric parameter, `default` if missing, `None` if not a number.
fn numeric_param(query: &str, key: &str, default: u16) -> Option<u16> {
    match query_param(query, key) {
        Some(value) => value.parse().ok(),
        None => Some(default),
    }
}

/// Maps a request target such as `/folder?folder=3` to a command. Paths are
/// matched by prefix.
pub fn parse_target(target: &str) -> Option<WebCommand> {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    if path.starts_with("/folder") {
        // folders are numbered from one, like on the card
        numeric_param(query, "folder", 1)
            .and_then(FolderIndex::from_one_based)
            .map(WebCommand::Folder)
    } else if path.starts_with("/play") {
        numeric_param(query, "track", 1).map(WebCommand::Track)
    } else if path.starts_with("/next") {
        Some(WebCommand::Next)
    } else if path.starts_with("/prev") {
        Some(WebCommand::Previous)
    } else if path.starts_with("/resume") {
        Some(WebCommand::Resume)
    } else if path.starts_with("/pause") {
        Some(WebCommand::Pause)
    } else {
        None
    }
}

/// Parses the request line of a raw HTTP request. Only `GET` is understood.
pub fn parse_request(request: &str) -> Option<WebCommand> {
    let request_line = request.lines().next()?;
    let mut parts = request_line.split(' ');
    let method = parts.next()?;
    let target = parts.next()?;
    if method != "GET" {
        return None;
    }
    parse_target(target)
}

/// Reads until the end of the request head, a full buffer or EOF.
async fn read_request_head<C: Read>(
    connection: &mut C,
    buffer: &mut [u8],
) -> Result<usize, C::Error> {
    let mut len = 0;
    while len < buffer.len() {
        let n = connection.read(&mut buffer[len..]).await?;
        if n == 0 {
            break;
        }
        len += n;
        if buffer[..len].windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    Ok(len)
}

/// Handles one request on `connection` and answers with the control page.
/// Returns the command that was forwarded to the player, if any.
pub async fn serve_connection<C, P>(
    connection: &mut C,
    player: &mut P,
    buffer: &mut [u8],
) -> Result<Option<WebCommand>, C::Error>
where
    C: Read + Write,
    P: PlayerControl,
{
    let len = read_request_head(connection, buffer).await?;
    let request = core::str::from_utf8(&buffer[..len]).unwrap_or_else(|err| {
        // a request line cut off in a multi-byte character is still usable
        core::str::from_utf8(&buffer[..err.valid_up_to()]).unwrap_or_default()
    });

    let command = parse_request(request);
    match command {
        Some(command) => {
            info!("Web command: {:?}", command);
            player
                .send(command.into())
                .await
                .print_err("Failed to forward web command");
        }
        None => debug!(
            "No command in request {:?}",
            request.lines().next().unwrap_or_default()
        ),
    }

    connection.write_all(RESPONSE_HEADER).await?;
    connection.write_all(INDEX_HTML.as_bytes()).await?;
    if let Err(err) = connection.flush().await {
        warn!("Failed to flush web response: {:?}", err);
    }

    Ok(command)
}
