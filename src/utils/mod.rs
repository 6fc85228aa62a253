//! Shared utility functions.
//!
//! - `text`: slugs, whitespace cleanup and length limits applied to legacy text
//! - `pricing`: legacy cost and renewal blobs to normalized prices

pub mod pricing;
mod text;

pub use pricing::{decode_cost, decode_renewal, parse_amount_cents, PriceError, PriceSpec};
pub use text::{clean_text, html_unescape, slugify, truncate_chars, SLUG_MAX_LEN};
