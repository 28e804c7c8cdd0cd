//! Header negotiation primitives.
//!
//! Everything here is synchronous and allocation-light: parse a header into a
//! [`PriorityQueue`] of candidates, then pop them in preference order.
//!
//! - [`parse_media_types`]: `Accept` and `Content-Type`.
//! - [`select_encoding`]: `Accept-Encoding`.
//!
//! Both share the same ordering rule: higher `q` first, and on equal `q` an
//! explicit `q=` beats an implicit one.

pub mod encoding;
pub mod media_type;
pub mod priority;
pub mod quality;

pub use encoding::{
    Compressor, ContentEncoding, EncodingCandidate, compress, select_encoding,
    select_encoding_token,
};
pub use media_type::{HeaderParseError, MediaTypeCandidate, ResolvedMediaType, parse_media_types};
pub use priority::{Prioritized, PriorityQueue};
pub use quality::{Quality, QualityError};
