use serde::{Deserialize, Deserializer};
use std::time::{Instant, SystemTime};

/// Station identifier as assigned by the server
pub type StationId = String;

/// Lifecycle of the coordinator's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closing,
}

/// What the player is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Playback {
    /// Nothing loaded
    #[default]
    Idle,
    Playing,
    Paused,
    /// A song ended or was skipped and nothing has started yet
    Stopped,
}

/// Song rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rating {
    #[default]
    Unrated,
    Loved,
}

impl Rating {
    /// Wire rating: `1` is a thumbs-up, anything else is unrated
    pub(crate) fn from_wire(value: Option<i64>) -> Self {
        match value {
            Some(1) => Rating::Loved,
            _ => Rating::Unrated,
        }
    }
}

/// The song currently loaded in the player
#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artwork_url: Option<String>,
    pub duration_seconds: Option<u32>,
    /// Position as of `position_updated_at`
    pub position_seconds: u32,
    pub rating: Rating,
    /// Opaque token identifying the track, used to seed new stations
    pub track_token: Option<String>,
    /// Name of the station the song was picked from (relevant in QuickMix)
    pub song_station_name: Option<String>,
    pub position_updated_at: Instant,
}

impl Song {
    /// Position extrapolated to `now`, assuming playback ran since the last update
    pub fn position_at(&self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.position_updated_at).as_secs();
        let position = u64::from(self.position_seconds) + elapsed;
        let position = u32::try_from(position).unwrap_or(u32::MAX);
        match self.duration_seconds {
            Some(duration) => position.min(duration),
            None => position,
        }
    }
}

/// A station in the user's library
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    #[serde(deserialize_with = "string_or_number")]
    pub id: StationId,
    pub name: String,

    /// This is the QuickMix station itself
    #[serde(default)]
    pub is_quick_mix: bool,

    /// This station is part of the QuickMix rotation
    #[serde(default)]
    pub is_quick_mixed: bool,
}

impl Station {
    pub fn new(id: impl Into<StationId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_quick_mix: false,
            is_quick_mixed: false,
        }
    }
}

/// Ordered station list, unique by id, in server order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationList {
    stations: Vec<Station>,
}

impl StationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Station> {
        self.stations.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.name == name)
    }

    /// Look a station up by id, falling back to its display name
    pub fn find(&self, id_or_name: &str) -> Option<&Station> {
        self.get(id_or_name).or_else(|| self.by_name(id_or_name))
    }

    /// Display names in server order, for source selection
    pub fn names(&self) -> Vec<String> {
        self.stations.iter().map(|s| s.name.clone()).collect()
    }
}

impl FromIterator<Station> for StationList {
    /// Builds the list keeping the first occurrence of each id
    fn from_iter<I: IntoIterator<Item = Station>>(iter: I) -> Self {
        let mut stations: Vec<Station> = Vec::new();
        for station in iter {
            if stations.iter().any(|s| s.id == station.id) {
                tracing::debug!("Dropping duplicate station id {}", station.id);
                continue;
            }
            stations.push(station);
        }
        Self { stations }
    }
}

impl<'a> IntoIterator for &'a StationList {
    type Item = &'a Station;
    type IntoIter = std::slice::Iter<'a, Station>;

    fn into_iter(self) -> Self::IntoIter {
        self.stations.iter()
    }
}

/// Last connection-level fault, kept for observability
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub message: String,
    pub occurred_at: SystemTime,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            occurred_at: SystemTime::now(),
        }
    }
}

/// Snapshot of everything the bridge has told us
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub playback: Playback,
    pub current_song: Option<Song>,
    pub volume_db: f64,
    /// Upper gain bound reported by the server
    pub max_gain_db: f64,
    pub stations: StationList,
    pub current_station_id: Option<StationId>,
    pub last_error: Option<ErrorInfo>,
}

impl PlayerState {
    /// Empty state with the given gain ceiling
    pub fn empty(max_gain_db: f64) -> Self {
        Self {
            playback: Playback::Idle,
            current_song: None,
            volume_db: 0.0,
            max_gain_db,
            stations: StationList::new(),
            current_station_id: None,
            last_error: None,
        }
    }

    /// The current station, resolved through the current station list
    pub fn current_station(&self) -> Option<&Station> {
        self.current_station_id
            .as_deref()
            .and_then(|id| self.stations.get(id))
    }

    /// Display name of the current source
    pub fn source(&self) -> Option<&str> {
        self.current_station().map(|s| s.name.as_str())
    }

    /// Selectable source names
    pub fn source_list(&self) -> Vec<String> {
        self.stations.names()
    }

    /// Playback position, advanced by wall-clock time while playing
    pub fn media_position(&self) -> Option<u32> {
        let song = self.current_song.as_ref()?;
        if self.playback == Playback::Playing {
            Some(song.position_at(Instant::now()))
        } else {
            Some(song.position_seconds)
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback == Playback::Playing
    }
}

/// Accept either a JSON string or number and yield a string
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn song(position: u32, duration: Option<u32>, at: Instant) -> Song {
        Song {
            title: "Test Song".into(),
            artist: "Test Artist".into(),
            album: String::new(),
            artwork_url: None,
            duration_seconds: duration,
            position_seconds: position,
            rating: Rating::Unrated,
            track_token: None,
            song_station_name: None,
            position_updated_at: at,
        }
    }

    #[test]
    fn station_list_drops_duplicate_ids() {
        let list: StationList = vec![
            Station::new("1", "Jazz"),
            Station::new("2", "Blues"),
            Station::new("1", "Jazz again"),
        ]
        .into_iter()
        .collect();

        assert_eq!(list.len(), 2);
        assert_eq!(list.names(), vec!["Jazz", "Blues"]);
    }

    #[test]
    fn find_prefers_id_over_name() {
        let list: StationList = vec![Station::new("Blues", "Jazz"), Station::new("2", "Blues")]
            .into_iter()
            .collect();

        assert_eq!(list.find("Blues").map(|s| s.name.as_str()), Some("Jazz"));
        assert_eq!(list.find("Jazz").map(|s| s.id.as_str()), Some("Blues"));
        assert!(list.find("Rock").is_none());
    }

    #[test]
    fn station_ids_accept_numbers() {
        let station: Station = serde_json::from_str(r#"{"id": 42, "name": "Mix"}"#).unwrap();
        assert_eq!(station.id, "42");
        assert!(!station.is_quick_mix);
    }

    #[test]
    fn source_follows_station_list() {
        let mut state = PlayerState::empty(10.0);
        state.current_station_id = Some("2".into());
        assert_eq!(state.source(), None);

        state.stations = vec![Station::new("2", "Blues")].into_iter().collect();
        assert_eq!(state.source(), Some("Blues"));

        state.stations = StationList::new();
        assert_eq!(state.source(), None);
        assert!(state.source_list().is_empty());
    }

    #[test]
    fn position_extrapolates_and_caps_at_duration() {
        let start = Instant::now();
        let s = song(10, Some(30), start);
        assert_eq!(s.position_at(start + Duration::from_secs(5)), 15);
        assert_eq!(s.position_at(start + Duration::from_secs(60)), 30);
        assert_eq!(song(10, None, start).position_at(start + Duration::from_secs(60)), 70);
    }

    #[test]
    fn paused_position_does_not_advance() {
        let mut state = PlayerState::empty(10.0);
        state.playback = Playback::Paused;
        state.current_song = Some(song(12, Some(100), Instant::now()));
        assert_eq!(state.media_position(), Some(12));
        state.playback = Playback::Idle;
        state.current_song = None;
        assert_eq!(state.media_position(), None);
    }
}
