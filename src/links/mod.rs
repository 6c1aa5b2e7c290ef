//! Virtual cross-links and the per-load anchor rewrite pass

pub mod codec;
mod resolver;

pub use codec::{CROSS_LINK_PREFIX, CrossLink};
pub use resolver::{CrossLinkResolver, PassOutcome, PassReport, parse_location_handler};
