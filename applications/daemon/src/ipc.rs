//! Line-based control socket
//!
//! Clients send one request per line and get one reply line back:
//! `ok`, `err <reason>`, or for `status` a JSON object. Requests are the
//! transport commands understood by [`Command`] plus:
//!
//! | request                          | effect                              |
//! |----------------------------------|-------------------------------------|
//! | `status`                         | JSON [`PlaybackStatus`] snapshot    |
//! | `open <id>...`                   | replace the queue and play          |
//! | `enqueue <now\|next\|last> <id>...` | add tracks                       |
//! | `album <name>` / `artist <name>` | queue and play a whole album/artist |
//! | `jump <index>`                   | play a queue position               |
//! | `move <from> <to>`               | reorder the queue                   |
//! | `remove <id>`                    | drop a track from the queue         |
//! | `repeat <off\|current\|all>`     | set repeat mode                     |
//! | `shuffle <off\|normal\|auto>`    | set shuffle mode                    |
//! | `sleep <ms\|off>`                | arm or disarm the sleep timer       |
//!
//! A connection counts as a bound client for as long as it stays open.
//!
//! [`PlaybackStatus`]: nocturne_playback::PlaybackStatus

use crate::error::{DaemonError, Result};
use nocturne_playback::{
    Command, EnqueueAction, PlaybackService, RepeatMode, ServiceMessage, ShuffleMode, TrackId,
};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// A parsed control request
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Status,
    Command(Command),
    Open(Vec<TrackId>),
    Enqueue(EnqueueAction, Vec<TrackId>),
    Album(String),
    Artist(String),
    Jump(usize),
    Move(usize, usize),
    Remove(TrackId),
    Repeat(RepeatMode),
    Shuffle(ShuffleMode),
    Sleep(Option<Duration>),
}

impl Request {
    /// The service message carrying this request, `None` for `status`
    pub fn into_message(self) -> Option<ServiceMessage> {
        let message = match self {
            Self::Status => return None,
            Self::Command(command) => ServiceMessage::Command(command),
            Self::Open(tracks) => ServiceMessage::Open {
                tracks,
                start: Some(0),
            },
            Self::Enqueue(action, tracks) => ServiceMessage::Enqueue { tracks, action },
            Self::Album(album) => ServiceMessage::OpenAlbum {
                album,
                filter: None,
            },
            Self::Artist(artist) => ServiceMessage::OpenArtist {
                artist,
                filter: None,
            },
            Self::Jump(index) => ServiceMessage::SetQueuePosition(index),
            Self::Move(from, to) => ServiceMessage::MoveItem { from, to },
            Self::Remove(id) => ServiceMessage::RemoveTrack(id),
            Self::Repeat(mode) => ServiceMessage::SetRepeat(mode),
            Self::Shuffle(mode) => ServiceMessage::SetShuffle(mode),
            Self::Sleep(after) => ServiceMessage::SleepTimer(after),
        };
        Some(message)
    }
}

fn bad(line: &str) -> DaemonError {
    DaemonError::BadRequest(line.trim().to_string())
}

fn parse_number<T: FromStr>(word: Option<&str>, line: &str) -> Result<T> {
    word.and_then(|word| word.parse().ok()).ok_or_else(|| bad(line))
}

fn parse_ids<'a>(words: impl Iterator<Item = &'a str>, line: &str) -> Result<Vec<TrackId>> {
    let tracks = words
        .map(|word| word.parse::<u64>().map(TrackId).map_err(|_| bad(line)))
        .collect::<Result<Vec<_>>>()?;
    if tracks.is_empty() {
        return Err(bad(line));
    }
    Ok(tracks)
}

impl FromStr for Request {
    type Err = DaemonError;

    fn from_str(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        let mut words = trimmed.split_whitespace();
        let name = words.next().unwrap_or_default().to_ascii_lowercase();

        // Everything after the first word, spaces kept
        let rest = trimmed
            .get(name.len()..)
            .unwrap_or_default()
            .trim()
            .to_string();

        let request = match name.as_str() {
            "status" => Self::Status,
            "open" => Self::Open(parse_ids(&mut words, line)?),
            "enqueue" => {
                let action = match words.next().map(str::to_ascii_lowercase).as_deref() {
                    Some("now") => EnqueueAction::Now,
                    Some("next") => EnqueueAction::Next,
                    Some("last") => EnqueueAction::Last,
                    _ => return Err(bad(line)),
                };
                Self::Enqueue(action, parse_ids(&mut words, line)?)
            }
            "album" if !rest.is_empty() => Self::Album(rest),
            "artist" if !rest.is_empty() => Self::Artist(rest),
            "jump" => Self::Jump(parse_number(words.next(), line)?),
            "move" => Self::Move(
                parse_number(words.next(), line)?,
                parse_number(words.next(), line)?,
            ),
            "remove" => Self::Remove(TrackId(parse_number(words.next(), line)?)),
            "repeat" => Self::Repeat(match words.next().map(str::to_ascii_lowercase).as_deref() {
                Some("off") => RepeatMode::Off,
                Some("current") => RepeatMode::Current,
                Some("all") => RepeatMode::All,
                _ => return Err(bad(line)),
            }),
            "shuffle" => Self::Shuffle(match words.next().map(str::to_ascii_lowercase).as_deref() {
                Some("off") => ShuffleMode::Off,
                Some("normal") => ShuffleMode::Normal,
                Some("auto") => ShuffleMode::Auto,
                _ => return Err(bad(line)),
            }),
            "sleep" => match words.next() {
                Some(word) if word.eq_ignore_ascii_case("off") => Self::Sleep(None),
                word => Self::Sleep(Some(Duration::from_millis(parse_number(word, line)?))),
            },
            _ => return Ok(Self::Command(trimmed.parse()?)),
        };

        let takes_rest = matches!(request, Self::Album(_) | Self::Artist(_));
        if !takes_rest && words.next().is_some() {
            return Err(bad(line));
        }
        Ok(request)
    }
}

/// Answer one request line
pub async fn respond(service: &Arc<PlaybackService>, line: &str) -> String {
    match handle(service, line).await {
        Ok(reply) => reply,
        Err(e) => format!("err {e}"),
    }
}

async fn handle(service: &Arc<PlaybackService>, line: &str) -> Result<String> {
    let request: Request = line.parse()?;
    tracing::debug!(?request, "Control request");

    let Some(message) = request.into_message() else {
        return Ok(serde_json::to_string(&service.status())?);
    };
    service.send(message)?;

    // Reply once the engine has applied it
    let service = Arc::clone(service);
    tokio::task::spawn_blocking(move || service.flush())
        .await
        .map_err(|e| DaemonError::Io(std::io::Error::other(e)))??;
    Ok("ok".to_string())
}

async fn handle_connection(stream: TcpStream, service: Arc<PlaybackService>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let mut reply = respond(&service, &line).await;
        reply.push('\n');
        writer.write_all(reply.as_bytes()).await?;
    }
    Ok(())
}

/// Accept control connections until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    service: Arc<PlaybackService>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    tokio::pin!(shutdown);
    tracing::info!(address = %listener.local_addr()?, "Control socket listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                tracing::debug!(%peer, "Client connected");

                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    if let Err(e) = service.send(ServiceMessage::Bind) {
                        tracing::warn!(error = %e, "Could not register client");
                        return;
                    }
                    if let Err(e) = handle_connection(stream, Arc::clone(&service)).await {
                        tracing::debug!(%peer, error = %e, "Client connection ended with error");
                    }
                    let _ = service.send(ServiceMessage::Unbind);
                    tracing::debug!(%peer, "Client disconnected");
                });
            }
            () = &mut shutdown => {
                tracing::info!("Control socket closing");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Request {
        line.parse().unwrap()
    }

    #[test]
    fn test_parses_queue_requests() {
        assert_eq!(parse("status"), Request::Status);
        assert_eq!(
            parse("open 1 2 3"),
            Request::Open(vec![TrackId(1), TrackId(2), TrackId(3)])
        );
        assert_eq!(
            parse("enqueue NEXT 9"),
            Request::Enqueue(EnqueueAction::Next, vec![TrackId(9)])
        );
        assert_eq!(parse("jump 4"), Request::Jump(4));
        assert_eq!(parse("move 0 3"), Request::Move(0, 3));
        assert_eq!(parse("remove 12"), Request::Remove(TrackId(12)));
    }

    #[test]
    fn test_parses_modes_and_timer() {
        assert_eq!(parse("repeat all"), Request::Repeat(RepeatMode::All));
        assert_eq!(parse("shuffle normal"), Request::Shuffle(ShuffleMode::Normal));
        assert_eq!(parse("sleep off"), Request::Sleep(None));
        assert_eq!(
            parse("sleep 60000"),
            Request::Sleep(Some(Duration::from_secs(60)))
        );
    }

    #[test]
    fn test_album_keeps_spaces() {
        assert_eq!(
            parse("album  The Dark Side "),
            Request::Album("The Dark Side".to_string())
        );
        assert_eq!(parse("artist Nina"), Request::Artist("Nina".to_string()));
    }

    #[test]
    fn test_falls_back_to_transport_commands() {
        assert_eq!(parse("togglepause"), Request::Command(Command::TogglePause));
        assert_eq!(
            parse("seek 1500"),
            Request::Command(Command::Seek(Duration::from_millis(1500)))
        );
    }

    #[test]
    fn test_rejects_malformed_requests() {
        for line in [
            "open",
            "open x",
            "enqueue soon 1",
            "jump",
            "move 1",
            "repeat twice",
            "shuffle",
            "sleep later",
            "status now",
            "album",
            "dance",
        ] {
            assert!(line.parse::<Request>().is_err(), "{line:?} should not parse");
        }
    }

    #[test]
    fn test_status_has_no_message() {
        assert!(Request::Status.into_message().is_none());
        assert!(matches!(
            Request::Jump(2).into_message(),
            Some(ServiceMessage::SetQueuePosition(2))
        ));
    }
}
