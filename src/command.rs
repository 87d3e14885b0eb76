use crate::error::CommandError;
use crate::protocol::ResponseKind;
use crate::types::StationId;

/// Seed used when creating a station from the current song
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StationSeed {
    #[default]
    Song,
    Artist,
}

impl StationSeed {
    pub fn wire_name(&self) -> &'static str {
        match self {
            StationSeed::Song => "song",
            StationSeed::Artist => "artist",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CommandError> {
        match value {
            "song" => Ok(StationSeed::Song),
            "artist" => Ok(StationSeed::Artist),
            other => Err(CommandError::InvalidArgument(format!(
                "unknown station seed type '{}'",
                other
            ))),
        }
    }
}

/// Kind of seed attached to a station
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedType {
    Artist,
    Song,
    Station,
}

impl SeedType {
    pub fn wire_name(&self) -> &'static str {
        match self {
            SeedType::Artist => "artist",
            SeedType::Song => "song",
            SeedType::Station => "station",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CommandError> {
        match value {
            "artist" => Ok(SeedType::Artist),
            "song" => Ok(SeedType::Song),
            "station" => Ok(SeedType::Station),
            other => Err(CommandError::InvalidArgument(format!(
                "unknown seed type '{}'",
                other
            ))),
        }
    }
}

/// An outbound action
///
/// Commands are plain values; turning one into a frame is done by
/// [`crate::protocol::encode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Ask the server for a full snapshot
    Query,
    Play,
    Pause,
    Next,
    TogglePlayback,
    VolumeUp,
    VolumeDown,
    /// Return to reference loudness
    ResetVolume,
    SetVolume {
        db: f64,
    },
    LoveSong,
    BanSong,
    /// Shelve the current song for a month
    TiredOfSong,
    /// Ask why the current song was picked
    ExplainSong,
    GetUpcoming,
    CreateStation {
        track_token: String,
        seed: StationSeed,
    },
    RenameStation {
        station_id: StationId,
        name: String,
    },
    DeleteStation {
        station_id: StationId,
    },
    SelectStation {
        station_id: StationId,
    },
    /// Replace the set of stations in the QuickMix rotation
    SetQuickMix {
        station_ids: Vec<StationId>,
    },
    AddSeed {
        music_id: String,
        station_id: StationId,
    },
    DeleteSeed {
        seed_id: String,
        seed_type: SeedType,
        station_id: StationId,
    },
    /// Station details, including seeds and feedback
    GetStationInfo {
        station_id: StationId,
    },
    DeleteFeedback {
        feedback_id: String,
        station_id: StationId,
    },
    GetStationModes {
        station_id: StationId,
    },
    SetStationMode {
        station_id: StationId,
        mode_id: u32,
    },
    Search {
        query: String,
    },
    GetGenres,
    CreateStationFromMusicId {
        music_id: String,
    },
    /// Add a station someone shared, by its numeric id
    AddSharedStation {
        station_id: StationId,
    },
    /// Re-establish the connection now; never sent to the server
    Reconnect,
}

impl Command {
    /// Name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::Query => "query",
            Command::Play => "play",
            Command::Pause => "pause",
            Command::Next => "next",
            Command::TogglePlayback => "toggle_playback",
            Command::VolumeUp => "volume_up",
            Command::VolumeDown => "volume_down",
            Command::ResetVolume => "reset_volume",
            Command::SetVolume { .. } => "set_volume",
            Command::LoveSong => "love_song",
            Command::BanSong => "ban_song",
            Command::TiredOfSong => "tired_of_song",
            Command::ExplainSong => "explain_song",
            Command::GetUpcoming => "get_upcoming",
            Command::CreateStation { .. } => "create_station",
            Command::RenameStation { .. } => "rename_station",
            Command::DeleteStation { .. } => "delete_station",
            Command::SelectStation { .. } => "select_station",
            Command::SetQuickMix { .. } => "set_quick_mix",
            Command::AddSeed { .. } => "add_seed",
            Command::DeleteSeed { .. } => "delete_seed",
            Command::GetStationInfo { .. } => "get_station_info",
            Command::DeleteFeedback { .. } => "delete_feedback",
            Command::GetStationModes { .. } => "get_station_modes",
            Command::SetStationMode { .. } => "set_station_mode",
            Command::Search { .. } => "search",
            Command::GetGenres => "get_genres",
            Command::CreateStationFromMusicId { .. } => "create_station_from_music_id",
            Command::AddSharedStation { .. } => "add_shared_station",
            Command::Reconnect => "reconnect",
        }
    }

    /// Reply event the server answers this command with, if any
    pub fn response_kind(&self) -> Option<ResponseKind> {
        match self {
            Command::ExplainSong => Some(ResponseKind::SongExplanation),
            Command::GetUpcoming => Some(ResponseKind::Upcoming),
            Command::GetStationInfo { .. } => Some(ResponseKind::StationInfo),
            Command::GetStationModes { .. } => Some(ResponseKind::StationModes),
            Command::Search { .. } => Some(ResponseKind::SearchResults),
            Command::GetGenres => Some(ResponseKind::Genres),
            _ => None,
        }
    }

    /// Reject arguments the server could not act on
    pub fn validate(&self) -> Result<(), CommandError> {
        match self {
            Command::SetVolume { db } if !db.is_finite() => Err(CommandError::InvalidArgument(
                format!("volume must be a finite dB value, got {}", db),
            )),
            Command::CreateStation { track_token, .. } => non_empty("track token", track_token),
            Command::RenameStation { station_id, name } => {
                non_empty("station id", station_id)?;
                non_empty("station name", name)
            }
            Command::DeleteStation { station_id }
            | Command::SelectStation { station_id }
            | Command::GetStationInfo { station_id }
            | Command::GetStationModes { station_id }
            | Command::SetStationMode { station_id, .. } => non_empty("station id", station_id),
            Command::AddSharedStation { station_id } => {
                non_empty("station id", station_id)?;
                if station_id.chars().all(|c| c.is_ascii_digit()) {
                    Ok(())
                } else {
                    Err(CommandError::InvalidArgument(format!(
                        "shared station id must be numeric, got '{}'",
                        station_id
                    )))
                }
            }
            Command::SetQuickMix { station_ids } => station_ids
                .iter()
                .try_for_each(|id| non_empty("station id", id)),
            Command::AddSeed {
                music_id,
                station_id,
            } => {
                non_empty("music id", music_id)?;
                non_empty("station id", station_id)
            }
            Command::DeleteSeed {
                seed_id,
                station_id,
                ..
            } => {
                non_empty("seed id", seed_id)?;
                non_empty("station id", station_id)
            }
            Command::DeleteFeedback {
                feedback_id,
                station_id,
            } => {
                non_empty("feedback id", feedback_id)?;
                non_empty("station id", station_id)
            }
            Command::Search { query } => non_empty("search query", query),
            Command::CreateStationFromMusicId { music_id } => non_empty("music id", music_id),
            _ => Ok(()),
        }
    }
}

fn non_empty(what: &str, value: &str) -> Result<(), CommandError> {
    if value.trim().is_empty() {
        Err(CommandError::InvalidArgument(format!("{} must not be empty", what)))
    } else {
        Ok(())
    }
}
