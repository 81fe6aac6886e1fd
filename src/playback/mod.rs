pub mod buffering;
pub mod controller;
pub mod error;
pub mod progress;
pub mod scrubber;
pub mod seek;
pub mod service;
pub mod session;
pub mod state;

pub use controller::PlaybackController;
pub use error::{PlaybackError, PlayerError};
pub use progress::{BufferingDelegate, ObserverToken, PlaybackProgress};
pub use scrubber::{fraction_for_time, scrub_time_for_fraction, TimeUpdate};
pub use service::{PlaybackHandle, PlaybackService};
pub use session::{PlaybackSession, SessionId};
pub use state::PlaybackState;
