mod error;
mod health;
mod router;
mod state;

pub use error::{ApiError, ErrorBody};
pub use router::system_router;
pub use state::{AppState, AppStateBuilder, AppStateError, AppStateInner};
