use crate::protocol::{Event, SongPayload};
use crate::types::{ErrorInfo, Playback, PlayerState, Rating, Song};
use crate::volume::VolumeCurve;
use std::time::Instant;

/// Which top-level fields of [`PlayerState`] an update touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateDelta {
    pub playback: bool,
    pub song: bool,
    pub volume: bool,
    pub stations: bool,
    pub station: bool,
    pub last_error: bool,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        *self == StateDelta::default()
    }

    fn between(old: &PlayerState, new: &PlayerState) -> Self {
        Self {
            playback: old.playback != new.playback,
            song: !same_song(old.current_song.as_ref(), new.current_song.as_ref()),
            volume: old.volume_db != new.volume_db || old.max_gain_db != new.max_gain_db,
            stations: old.stations != new.stations,
            station: old.current_station_id != new.current_station_id,
            last_error: old.last_error != new.last_error,
        }
    }
}

/// Songs are equal if everything but the position timestamp matches
fn same_song(a: Option<&Song>, b: Option<&Song>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Song {
            position_updated_at: b.position_updated_at,
            ..a.clone()
        } == *b,
        _ => false,
    }
}

/// The authoritative player state, mutated only by applying events
#[derive(Debug, Clone)]
pub struct StateModel {
    state: PlayerState,
    curve: VolumeCurve,
}

impl StateModel {
    pub fn new(curve: VolumeCurve) -> Self {
        Self {
            state: PlayerState::empty(curve.max_db()),
            curve,
        }
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    /// Owned copy for readers outside the receive loop
    pub fn snapshot(&self) -> PlayerState {
        self.state.clone()
    }

    /// Volume curve bounded by the server-reported gain ceiling
    pub fn curve(&self) -> VolumeCurve {
        self.curve.with_max_db(self.state.max_gain_db)
    }

    /// Apply one event and report what changed
    pub fn apply(&mut self, event: &Event) -> StateDelta {
        self.apply_at(event, Instant::now())
    }

    /// Apply one event as of `now`
    pub fn apply_at(&mut self, event: &Event, now: Instant) -> StateDelta {
        let before = self.state.clone();

        match event {
            Event::Process(process) => {
                let playback = match (process.playing, process.paused) {
                    (false, _) => Playback::Idle,
                    (true, true) => Playback::Paused,
                    (true, false) => Playback::Playing,
                };
                if let Some(max_gain) = process.max_gain.filter(|g| g.is_finite()) {
                    self.state.max_gain_db = max_gain.max(self.curve.min_db());
                    self.state.volume_db = self.curve().clamp_db(self.state.volume_db);
                }
                if let Some(volume) = process.volume {
                    self.state.volume_db = self.curve().clamp_db(volume);
                }
                self.state.playback = playback;
                self.state.current_song = match (&process.song, playback) {
                    (_, Playback::Idle) | (None, _) => None,
                    (Some(song), _) => Some(song_from_payload(song, process.elapsed, now)),
                };
                self.state.current_station_id = non_empty(process.station_id.as_deref());
            }
            Event::Start(start) => {
                self.state.playback = Playback::Playing;
                self.state.current_song = Some(song_from_payload(&start.song, None, now));
                if let Some(id) = non_empty(start.station_id.as_deref()) {
                    self.state.current_station_id = Some(id);
                }
            }
            Event::Stop => {
                self.state.playback = Playback::Stopped;
                self.state.current_song = None;
            }
            Event::Stopped => {
                self.clear_playback_fields();
            }
            Event::Progress(progress) => {
                if let Some(song) = self.state.current_song.as_mut() {
                    song.position_seconds = whole_seconds(progress.elapsed);
                    song.position_updated_at = now;
                }
            }
            Event::Volume(db) => {
                self.state.volume_db = self.curve().clamp_db(*db);
            }
            Event::PlayState { paused } => {
                let was = self.state.playback;
                if matches!(was, Playback::Playing | Playback::Paused) {
                    let next = if *paused {
                        Playback::Paused
                    } else {
                        Playback::Playing
                    };
                    // Restart the position clock so paused time is not counted
                    if next != was {
                        if let Some(song) = self.state.current_song.as_mut() {
                            if was == Playback::Playing {
                                song.position_seconds = song.position_at(now);
                            }
                            song.position_updated_at = now;
                        }
                    }
                    self.state.playback = next;
                }
            }
            Event::Stations(stations) => {
                self.state.stations = stations.iter().cloned().collect();
            }
            Event::Response(..) | Event::Unknown(_) => {}
        }

        StateDelta::between(&before, &self.state)
    }

    /// Drop everything about the current song, keeping stations and volume
    pub fn clear_playback(&mut self) -> StateDelta {
        let before = self.state.clone();
        self.clear_playback_fields();
        StateDelta::between(&before, &self.state)
    }

    /// Return to the empty state
    pub fn reset(&mut self) -> StateDelta {
        let before = std::mem::replace(&mut self.state, PlayerState::empty(self.curve.max_db()));
        StateDelta::between(&before, &self.state)
    }

    /// Record a connection-level fault for observability
    pub fn record_error(&mut self, error: ErrorInfo) -> StateDelta {
        let before = self.state.clone();
        self.state.last_error = Some(error);
        StateDelta::between(&before, &self.state)
    }

    fn clear_playback_fields(&mut self) {
        self.state.playback = Playback::Idle;
        self.state.current_song = None;
        self.state.current_station_id = None;
    }
}

fn song_from_payload(payload: &SongPayload, elapsed: Option<f64>, now: Instant) -> Song {
    Song {
        title: payload.title.clone(),
        artist: payload.artist.clone(),
        album: payload.album.clone(),
        artwork_url: payload.cover_art.clone().filter(|url| !url.is_empty()),
        duration_seconds: payload.duration.map(whole_seconds),
        position_seconds: elapsed.map(whole_seconds).unwrap_or(0),
        rating: Rating::from_wire(payload.rating),
        track_token: payload.track_token.clone(),
        song_station_name: payload.song_station_name.clone(),
        position_updated_at: now,
    }
}

fn whole_seconds(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round().min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.is_empty()).map(str::to_string)
}
