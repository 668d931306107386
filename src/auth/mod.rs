//! Bearer-token identity. Tokens are issued by the account service; this
//! crate only verifies them.

pub mod claims;
pub mod jwt;

pub use claims::TokenKind;
pub use jwt::{AuthUser, JwtKeys};
