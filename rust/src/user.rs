mod structs;

pub use structs::{OwnerSummary, SessionIdentity, User, USER_SESSION_COOKIE};
