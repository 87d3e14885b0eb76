//! Rust library for remote-controlling a pianobar player over its WebSocket bridge
//!
//! pianobar is a console client for Pandora. A small bridge process exposes it
//! over a socket.io-style WebSocket; this library keeps a session with that
//! bridge alive and mirrors the player's state. It supports:
//!
//! - Automatic reconnection with exponential backoff
//! - A live snapshot of playback, current song, volume and stations
//! - Change notifications for any number of subscribers
//! - Playback, volume, rating and station management commands
//! - Query commands with typed reply kinds (upcoming songs, station info, search)
//! - A perceptual volume curve mapping decibels to a 0-100 scale
//!
//! # Quick Start
//!
//! ```no_run
//! use pianobar_remote::{Coordinator, CoordinatorConfig, StateUpdate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = Coordinator::new(CoordinatorConfig::new("192.168.1.50", 8080))?;
//!     let mut updates = coordinator.subscribe();
//!     coordinator.start();
//!
//!     // Wait for the first state update
//!     while let Ok(update) = updates.recv().await {
//!         if let StateUpdate::State(_) = update {
//!             break;
//!         }
//!     }
//!
//!     let state = coordinator.snapshot();
//!     println!("Stations: {:?}", state.source_list());
//!     if let Some(song) = &state.current_song {
//!         println!("Now playing: {} - {}", song.artist, song.title);
//!     }
//!
//!     coordinator.set_volume_percent(40).await?;
//!     coordinator.next().await?;
//!
//!     coordinator.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Named Actions
//!
//! Host applications that dispatch by name can use [`Coordinator::perform`]:
//!
//! ```no_run
//! # use pianobar_remote::{Coordinator, CoordinatorConfig};
//! # async fn demo(coordinator: &Coordinator) -> pianobar_remote::Result<()> {
//! coordinator.perform("select_station", &serde_json::json!({ "source": "Jazz Radio" })).await?;
//! let upcoming = coordinator.perform("get_upcoming", &serde_json::json!({})).await?;
//! println!("{:?}", upcoming);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Coordinator**: Connection loop, command dispatch and state ownership
//! - **Transport**: WebSocket sessions as channel pairs
//! - **Protocol**: Frame encoding and event decoding
//! - **State**: Applying events to the player snapshot
//! - **Types**: Domain types and data structures

pub mod actions;
mod backoff;
mod command;
mod config;
mod coordinator;
mod error;
pub mod protocol;
mod state;
mod subscription;
mod transport;
mod types;
mod volume;

// Public exports
pub use backoff::Backoff;
pub use command::{Command, SeedType, StationSeed};
pub use config::{CoordinatorConfig, DEFAULT_PORT};
pub use coordinator::Coordinator;
pub use error::{
    CommandError, ConnectError, DecodeError, PianobarError, RecvError, Result, SendError,
};
pub use protocol::{Event, Frame, ResponseKind};
pub use state::{StateDelta, StateModel};
pub use subscription::{StateReceiver, StateUpdate};
pub use transport::{FrameSender, Session, Transport, WsTransport};
pub use types::{
    ConnectionState, ErrorInfo, Playback, PlayerState, Rating, Song, Station, StationId,
    StationList,
};
pub use volume::VolumeCurve;
