mod claims;
pub mod extractors;
pub mod jwt;
pub mod lifecycle;
pub mod store;

pub use extractors::{AuthUser, ACCESS_COOKIE, REFRESH_COOKIE};
pub use lifecycle::{SessionManager, TokenPair};
