mod attempt;
pub mod controller;
pub mod id;
pub mod status;

pub use controller::{SessionController, SessionHandle};
pub use id::{Identity, SessionId};
pub use status::SessionStatus;
