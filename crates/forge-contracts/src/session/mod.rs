mod reducer;
mod state;
mod store;

pub use reducer::{reduce, Action, Outcome};
pub use state::{GenerationKind, InFlight, RequestTicket, SessionState};
pub use store::Store;
