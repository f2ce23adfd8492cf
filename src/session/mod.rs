// This is free and unencumbered software released into the public domain.

mod capture_session;
pub use capture_session::*;

mod directory;
pub use directory::*;

mod state;
pub use state::*;
