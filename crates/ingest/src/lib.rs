//! Inbound Message Ingestion
//!
//! Resolves the calling application from its token and validates the
//! push message body in either JSON or form encoding.

mod error;
mod parser;
mod registry;
mod token;

pub use error::IngestError;
pub use parser::{parse_message, MediaType};
pub use registry::AppRegistry;
pub use token::{extract_token, TOKEN_HEADER, TOKEN_QUERY_PARAM};
