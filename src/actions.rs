//! Named actions exposed to a host application
//!
//! Each entry turns a JSON argument object (as a service call would carry it)
//! into a [`Command`]. The table is static; nothing registers at runtime.

use crate::command::{Command, SeedType, StationSeed};
use crate::error::CommandError;
use crate::types::PlayerState;
use crate::volume::VolumeCurve;
use serde_json::Value;

/// State an action may need to build its command
pub struct ActionContext<'a> {
    pub state: &'a PlayerState,
    pub curve: VolumeCurve,
}

type Builder = fn(&Value, &ActionContext<'_>) -> Result<Command, CommandError>;

/// A named action
pub struct Action {
    pub name: &'static str,
    build: Builder,
}

impl Action {
    /// Build and validate the command for this action
    pub fn build(&self, args: &Value, ctx: &ActionContext<'_>) -> Result<Command, CommandError> {
        let command = (self.build)(args, ctx)?;
        command.validate()?;
        Ok(command)
    }
}

/// Every action, by name
pub static ACTIONS: &[Action] = &[
    Action { name: "play", build: play },
    Action { name: "pause", build: pause },
    Action { name: "next", build: next },
    Action { name: "toggle_playback", build: toggle_playback },
    Action { name: "volume_up", build: volume_up },
    Action { name: "volume_down", build: volume_down },
    Action { name: "reset_volume", build: reset_volume },
    Action { name: "set_volume", build: set_volume },
    Action { name: "love_song", build: love_song },
    Action { name: "ban_song", build: ban_song },
    Action { name: "tired_of_song", build: tired_of_song },
    Action { name: "explain_song", build: explain_song },
    Action { name: "get_upcoming", build: get_upcoming },
    Action { name: "create_station", build: create_station },
    Action { name: "rename_station", build: rename_station },
    Action { name: "delete_station", build: delete_station },
    Action { name: "select_station", build: select_station },
    Action { name: "set_quick_mix", build: set_quick_mix },
    Action { name: "add_seed", build: add_seed },
    Action { name: "delete_seed", build: delete_seed },
    Action { name: "get_station_info", build: get_station_info },
    Action { name: "delete_feedback", build: delete_feedback },
    Action { name: "get_station_modes", build: get_station_modes },
    Action { name: "set_station_mode", build: set_station_mode },
    Action { name: "search", build: search },
    Action { name: "get_genres", build: get_genres },
    Action { name: "create_station_from_music_id", build: create_station_from_music_id },
    Action { name: "add_shared_station", build: add_shared_station },
    Action { name: "reconnect", build: reconnect },
];

/// Find an action by name
pub fn lookup(name: &str) -> Option<&'static Action> {
    ACTIONS.iter().find(|a| a.name == name)
}

fn play(_: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::Play)
}

fn pause(_: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::Pause)
}

fn next(_: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::Next)
}

fn toggle_playback(_: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::TogglePlayback)
}

fn volume_up(_: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::VolumeUp)
}

fn volume_down(_: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::VolumeDown)
}

fn reset_volume(_: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::ResetVolume)
}

/// Takes either `percent` (0-100, through the volume curve) or raw `db`
fn set_volume(args: &Value, ctx: &ActionContext<'_>) -> Result<Command, CommandError> {
    if let Some(percent) = args.get("percent") {
        let percent = percent
            .as_f64()
            .filter(|p| (0.0..=100.0).contains(p))
            .ok_or_else(|| invalid("percent must be a number within 0..=100"))?;
        return Ok(Command::SetVolume {
            db: ctx.curve.percent_to_db(percent.round() as u8),
        });
    }
    let db = args
        .get("db")
        .and_then(Value::as_f64)
        .ok_or_else(|| invalid("set_volume needs 'percent' or 'db'"))?;
    Ok(Command::SetVolume {
        db: ctx.curve.clamp_db(db),
    })
}

fn love_song(_: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::LoveSong)
}

fn ban_song(_: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::BanSong)
}

fn tired_of_song(_: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::TiredOfSong)
}

fn explain_song(_: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::ExplainSong)
}

fn get_upcoming(_: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::GetUpcoming)
}

/// Seeds a new station from the song currently playing
fn create_station(args: &Value, ctx: &ActionContext<'_>) -> Result<Command, CommandError> {
    let seed = match opt_str(args, "type")? {
        Some(seed) => StationSeed::parse(&seed)?,
        None => StationSeed::default(),
    };
    let track_token = ctx
        .state
        .current_song
        .as_ref()
        .and_then(|song| song.track_token.clone())
        .ok_or_else(|| invalid("no track token available for the current song"))?;
    Ok(Command::CreateStation { track_token, seed })
}

fn rename_station(args: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::RenameStation {
        station_id: id_arg(args, "station_id")?,
        name: str_arg(args, "name")?,
    })
}

fn delete_station(args: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::DeleteStation {
        station_id: id_arg(args, "station_id")?,
    })
}

/// Takes `station_id`, or a `source` name resolved through the station list
fn select_station(args: &Value, ctx: &ActionContext<'_>) -> Result<Command, CommandError> {
    if args.get("station_id").is_some() {
        return Ok(Command::SelectStation {
            station_id: id_arg(args, "station_id")?,
        });
    }
    let source = str_arg(args, "source")?;
    let station = ctx
        .state
        .stations
        .find(&source)
        .ok_or_else(|| invalid(&format!("station not found: {}", source)))?;
    Ok(Command::SelectStation {
        station_id: station.id.clone(),
    })
}

fn set_quick_mix(args: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    let ids = args
        .get("station_ids")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("station_ids must be a list"))?;
    let station_ids = ids
        .iter()
        .map(id_value)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| invalid("station_ids must contain strings or numbers"))?;
    Ok(Command::SetQuickMix { station_ids })
}

fn add_seed(args: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::AddSeed {
        music_id: str_arg(args, "music_id")?,
        station_id: id_arg(args, "station_id")?,
    })
}

fn delete_seed(args: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::DeleteSeed {
        seed_id: str_arg(args, "seed_id")?,
        seed_type: SeedType::parse(&str_arg(args, "seed_type")?)?,
        station_id: id_arg(args, "station_id")?,
    })
}

fn get_station_info(args: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::GetStationInfo {
        station_id: id_arg(args, "station_id")?,
    })
}

fn delete_feedback(args: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::DeleteFeedback {
        feedback_id: str_arg(args, "feedback_id")?,
        station_id: id_arg(args, "station_id")?,
    })
}

fn get_station_modes(args: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::GetStationModes {
        station_id: id_arg(args, "station_id")?,
    })
}

fn set_station_mode(args: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    let mode_id = match args.get("mode_id") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .and_then(|n| u32::try_from(n).ok())
    .ok_or_else(|| invalid("mode_id must be a non-negative integer"))?;

    Ok(Command::SetStationMode {
        station_id: id_arg(args, "station_id")?,
        mode_id,
    })
}

fn search(args: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::Search {
        query: str_arg(args, "query")?,
    })
}

fn get_genres(_: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::GetGenres)
}

fn create_station_from_music_id(
    args: &Value,
    _: &ActionContext<'_>,
) -> Result<Command, CommandError> {
    Ok(Command::CreateStationFromMusicId {
        music_id: str_arg(args, "music_id")?,
    })
}

fn add_shared_station(args: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::AddSharedStation {
        station_id: id_arg(args, "station_id")?,
    })
}

fn reconnect(_: &Value, _: &ActionContext<'_>) -> Result<Command, CommandError> {
    Ok(Command::Reconnect)
}

fn invalid(msg: &str) -> CommandError {
    CommandError::InvalidArgument(msg.to_string())
}

fn str_arg(args: &Value, key: &str) -> Result<String, CommandError> {
    opt_str(args, key)?.ok_or_else(|| invalid(&format!("missing argument '{}'", key)))
}

fn opt_str(args: &Value, key: &str) -> Result<Option<String>, CommandError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(&format!("argument '{}' must be a string", key))),
    }
}

/// Ids arrive as strings or numbers depending on the caller
fn id_arg(args: &Value, key: &str) -> Result<String, CommandError> {
    args.get(key)
        .and_then(id_value)
        .ok_or_else(|| invalid(&format!("missing argument '{}'", key)))
}

fn id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
