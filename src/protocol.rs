//! Wire codec for the pianobar WebSocket bridge
//!
//! Every frame is a socket.io event packet: the packet type `2` followed by
//! a JSON array `[name, payload]`. Decoding is keyed on `name`; names we do
//! not know decode to [`Event::Unknown`] so server additions never break us.

use crate::command::Command;
use crate::error::DecodeError;
use crate::types::{string_or_number, Station, StationId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::fmt;

/// socket.io packet type for events
const EVENT_PACKET: &str = "2";

/// One text message read from or written to the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(String);

impl Frame {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Build an event packet
    pub fn event(name: &str, payload: Value) -> Self {
        Self(format!("{}{}", EVENT_PACKET, json!([name, payload])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reply events answering a query command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    SongExplanation,
    Upcoming,
    StationInfo,
    StationModes,
    SearchResults,
    Genres,
}

impl ResponseKind {
    pub fn wire_name(&self) -> &'static str {
        match self {
            ResponseKind::SongExplanation => "song_explanation",
            ResponseKind::Upcoming => "upcoming",
            ResponseKind::StationInfo => "station_info",
            ResponseKind::StationModes => "station_modes",
            ResponseKind::SearchResults => "search_results",
            ResponseKind::Genres => "genres",
        }
    }

    fn from_wire(name: &str) -> Option<Self> {
        match name {
            "song_explanation" => Some(ResponseKind::SongExplanation),
            "upcoming" => Some(ResponseKind::Upcoming),
            "station_info" => Some(ResponseKind::StationInfo),
            "station_modes" => Some(ResponseKind::StationModes),
            "search_results" => Some(ResponseKind::SearchResults),
            "genres" => Some(ResponseKind::Genres),
            _ => None,
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Song metadata as sent in `process` and `start`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongPayload {
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub cover_art: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub track_token: Option<String>,
    #[serde(default)]
    pub song_station_name: Option<String>,
}

/// Full player snapshot
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPayload {
    pub playing: bool,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub max_gain: Option<f64>,
    #[serde(default)]
    pub station: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub station_id: Option<StationId>,
    #[serde(default)]
    pub elapsed: Option<f64>,
    #[serde(default)]
    pub song: Option<SongPayload>,
}

/// A new song started
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    #[serde(flatten)]
    pub song: SongPayload,
    #[serde(default)]
    pub station: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub station_id: Option<StationId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressPayload {
    pub elapsed: f64,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct PlayStatePayload {
    paused: bool,
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Full snapshot of playback, song and volume
    Process(ProcessPayload),
    Start(StartPayload),
    /// Current song ended
    Stop,
    /// Server lost its upstream session entirely
    Stopped,
    Progress(ProgressPayload),
    /// Gain in dB
    Volume(f64),
    PlayState { paused: bool },
    Stations(Vec<Station>),
    /// Reply to a query command
    Response(ResponseKind, Value),
    /// Anything we do not understand, kept raw
    Unknown(String),
}

impl Event {
    /// Short name for logging
    pub fn name(&self) -> &str {
        match self {
            Event::Process(_) => "process",
            Event::Start(_) => "start",
            Event::Stop => "stop",
            Event::Stopped => "stopped",
            Event::Progress(_) => "progress",
            Event::Volume(_) => "volume",
            Event::PlayState { .. } => "playState",
            Event::Stations(_) => "stations",
            Event::Response(kind, _) => kind.wire_name(),
            Event::Unknown(_) => "unknown",
        }
    }
}

/// Decode one inbound frame
pub fn decode(frame: &Frame) -> Result<Event, DecodeError> {
    let text = frame.as_str();

    // Only event packets carry state; open/connect/pong packets are ignored
    let Some(body) = text.strip_prefix(EVENT_PACKET) else {
        return Ok(Event::Unknown(text.to_string()));
    };

    let value: Value =
        serde_json::from_str(body).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let mut items = match value {
        Value::Array(items) => items.into_iter(),
        _ => return Err(DecodeError::Malformed("event packet is not an array".to_string())),
    };

    let name = match items.next() {
        Some(Value::String(name)) => name,
        _ => return Err(DecodeError::Malformed("event packet has no name".to_string())),
    };
    let payload = items.next().unwrap_or(Value::Null);

    let event = match name.as_str() {
        "process" => Event::Process(payload_as(&name, payload)?),
        "start" => Event::Start(payload_as(&name, payload)?),
        "stop" => Event::Stop,
        "stopped" => Event::Stopped,
        "progress" => Event::Progress(payload_as(&name, payload)?),
        "volume" => Event::Volume(payload_as(&name, payload)?),
        "playState" => {
            let state: PlayStatePayload = payload_as(&name, payload)?;
            Event::PlayState {
                paused: state.paused,
            }
        }
        "stations" => Event::Stations(payload_as(&name, payload)?),
        other => match ResponseKind::from_wire(other) {
            Some(kind) => Event::Response(kind, payload),
            None => Event::Unknown(text.to_string()),
        },
    };

    Ok(event)
}

fn payload_as<T: DeserializeOwned>(name: &str, payload: Value) -> Result<T, DecodeError> {
    serde_json::from_value(payload).map_err(|e| DecodeError::Malformed(format!("{}: {}", name, e)))
}

fn opt_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "string_or_number")] String);

    let value = Option::<Wrapper>::deserialize(deserializer)?;
    Ok(value.map(|Wrapper(s)| s))
}

/// Encode a command as a frame
///
/// Returns `None` for commands handled locally by the coordinator.
pub fn encode(command: &Command) -> Option<Frame> {
    let action = |name: &str| ("action", json!(name));

    let (name, payload) = match command {
        Command::Query => ("query", Value::Null),
        Command::Play => action("playback.play"),
        Command::Pause => action("playback.pause"),
        Command::Next => action("playback.next"),
        Command::TogglePlayback => action("playback.toggle"),
        Command::VolumeUp => action("volume.up"),
        Command::VolumeDown => action("volume.down"),
        Command::ResetVolume => action("volume.reset"),
        Command::SetVolume { db } => ("action", json!({ "action": "volume.set", "volume": db })),
        Command::LoveSong => action("song.love"),
        Command::BanSong => action("song.ban"),
        Command::TiredOfSong => action("song.tired"),
        Command::ExplainSong => action("song.explain"),
        Command::GetUpcoming => action("query.upcoming"),
        Command::CreateStation { track_token, seed } => (
            "station.createFrom",
            json!({ "trackToken": track_token, "type": seed.wire_name() }),
        ),
        Command::RenameStation { station_id, name } => (
            "station.rename",
            json!({ "stationId": station_id, "newName": name }),
        ),
        Command::DeleteStation { station_id } => ("station.delete", json!(station_id)),
        Command::SelectStation { station_id } => ("station.change", json!(station_id)),
        Command::SetQuickMix { station_ids } => ("station.setQuickMix", json!(station_ids)),
        Command::AddSeed {
            music_id,
            station_id,
        } => (
            "station.addMusic",
            json!({ "musicId": music_id, "stationId": station_id }),
        ),
        Command::DeleteSeed {
            seed_id,
            seed_type,
            station_id,
        } => (
            "station.deleteSeed",
            json!({ "seedId": seed_id, "seedType": seed_type.wire_name(), "stationId": station_id }),
        ),
        Command::GetStationInfo { station_id } => {
            ("station.getInfo", json!({ "stationId": station_id }))
        }
        Command::DeleteFeedback {
            feedback_id,
            station_id,
        } => (
            "station.deleteFeedback",
            json!({ "feedbackId": feedback_id, "stationId": station_id }),
        ),
        Command::GetStationModes { station_id } => {
            ("station.getModes", json!({ "stationId": station_id }))
        }
        Command::SetStationMode {
            station_id,
            mode_id,
        } => (
            "station.setMode",
            json!({ "stationId": station_id, "modeId": mode_id }),
        ),
        Command::Search { query } => ("music.search", json!({ "query": query })),
        Command::GetGenres => ("station.getGenres", json!({})),
        Command::CreateStationFromMusicId { music_id } => {
            ("station.addGenre", json!({ "musicId": music_id }))
        }
        Command::AddSharedStation { station_id } => {
            ("station.addShared", json!({ "stationId": station_id }))
        }
        Command::Reconnect => return None,
    };

    Some(Frame::event(name, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{SeedType, StationSeed};

    fn frame(text: &str) -> Frame {
        Frame::new(text)
    }

    #[test]
    fn decodes_process_snapshot() {
        let event = decode(&frame(
            r#"2["process",{"playing":true,"paused":false,"volume":-5,"maxGain":10,
            "station":"Test Station 1","stationId":"123456789","elapsed":45,
            "song":{"title":"Test Song","artist":"Test Artist","album":"Test Album",
            "coverArt":"https://example.com/art.jpg","rating":1,"duration":240,
            "trackToken":"test_track_token"}}]"#,
        ))
        .unwrap();

        let Event::Process(process) = event else {
            panic!("expected process, got {:?}", event);
        };
        assert!(process.playing);
        assert_eq!(process.volume, Some(-5.0));
        assert_eq!(process.station_id.as_deref(), Some("123456789"));
        let song = process.song.unwrap();
        assert_eq!(song.title, "Test Song");
        assert_eq!(song.rating, Some(1));
        assert_eq!(song.track_token.as_deref(), Some("test_track_token"));
    }

    #[test]
    fn decodes_simple_events() {
        assert_eq!(decode(&frame(r#"2["volume",-10]"#)).unwrap(), Event::Volume(-10.0));
        assert_eq!(decode(&frame(r#"2["stop"]"#)).unwrap(), Event::Stop);
        assert_eq!(
            decode(&frame(r#"2["playState",{"paused":true}]"#)).unwrap(),
            Event::PlayState { paused: true }
        );
        assert_eq!(
            decode(&frame(r#"2["progress",{"elapsed":67,"duration":240}]"#)).unwrap(),
            Event::Progress(ProgressPayload {
                elapsed: 67.0,
                duration: Some(240.0)
            })
        );
    }

    #[test]
    fn decodes_start_with_numeric_station_id() {
        let event =
            decode(&frame(r#"2["start",{"title":"A","artist":"B","stationId":77}]"#)).unwrap();
        let Event::Start(start) = event else {
            panic!("expected start");
        };
        assert_eq!(start.song.title, "A");
        assert_eq!(start.station_id.as_deref(), Some("77"));
    }

    #[test]
    fn decodes_station_list() {
        let event = decode(&frame(
            r#"2["stations",[{"id":"1","name":"Jazz","isQuickMix":false},{"id":"2","name":"QuickMix","isQuickMix":true}]]"#,
        ))
        .unwrap();
        let Event::Stations(stations) = event else {
            panic!("expected stations");
        };
        assert_eq!(stations.len(), 2);
        assert!(stations[1].is_quick_mix);
    }

    #[test]
    fn reply_events_keep_their_payload() {
        let event = decode(&frame(r#"2["upcoming",[{"title":"Next"}]]"#)).unwrap();
        assert_eq!(
            event,
            Event::Response(ResponseKind::Upcoming, json!([{ "title": "Next" }]))
        );
    }

    #[test]
    fn unknown_names_and_non_event_packets_are_not_errors() {
        assert!(matches!(
            decode(&frame(r#"2["lyrics",{"text":"la la"}]"#)),
            Ok(Event::Unknown(_))
        ));
        assert!(matches!(
            decode(&frame(r#"0{"sid":"abc123"}"#)),
            Ok(Event::Unknown(_))
        ));
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(matches!(decode(&frame(r#"2["invalid"#)), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode(&frame(r#"2{"a":1}"#)), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode(&frame(r#"2[5,{}]"#)), Err(DecodeError::Malformed(_))));
        assert!(matches!(
            decode(&frame(r#"2["progress",{"duration":240}]"#)),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode(&frame(r#"2["volume","loud"]"#)),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode(&frame(r#"2["stations",[{"name":"No id"}]]"#)),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn encodes_actions() {
        assert_eq!(
            encode(&Command::Pause).unwrap().as_str(),
            r#"2["action","playback.pause"]"#
        );
        assert_eq!(encode(&Command::Query).unwrap().as_str(), r#"2["query",null]"#);

        let frame = encode(&Command::SetVolume { db: -12.5 }).unwrap();
        let body: Value = serde_json::from_str(&frame.as_str()[1..]).unwrap();
        assert_eq!(body, json!(["action", { "action": "volume.set", "volume": -12.5 }]));
    }

    #[test]
    fn encodes_station_commands() {
        let frame = encode(&Command::CreateStation {
            track_token: "tok".into(),
            seed: StationSeed::Artist,
        })
        .unwrap();
        let body: Value = serde_json::from_str(&frame.as_str()[1..]).unwrap();
        assert_eq!(
            body,
            json!(["station.createFrom", { "trackToken": "tok", "type": "artist" }])
        );

        let frame = encode(&Command::DeleteSeed {
            seed_id: "s1".into(),
            seed_type: SeedType::Station,
            station_id: "9".into(),
        })
        .unwrap();
        let body: Value = serde_json::from_str(&frame.as_str()[1..]).unwrap();
        assert_eq!(
            body,
            json!(["station.deleteSeed", { "seedId": "s1", "seedType": "station", "stationId": "9" }])
        );

        assert_eq!(
            encode(&Command::SelectStation {
                station_id: "42".into()
            })
            .unwrap()
            .as_str(),
            r#"2["station.change","42"]"#
        );
    }

    #[test]
    fn reconnect_is_not_a_wire_command() {
        assert!(encode(&Command::Reconnect).is_none());
    }
}
