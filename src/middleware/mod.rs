pub mod headers;
pub mod identity_mint;
pub mod identity_validate;

pub use headers::{strip_spoofable_headers, INTERNAL_IDENTITY_HEADER, SPOOFABLE_HEADERS};
pub use identity_mint::identity_mint_middleware;
pub use identity_validate::identity_validate_middleware;
