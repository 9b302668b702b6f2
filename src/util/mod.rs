//! Small helpers shared by the command-line front end.
//!
//! - **URL validation**: feed URLs are checked before they are registered

mod url_validator;

pub use url_validator::{validate_feed_url, UrlValidationError};
