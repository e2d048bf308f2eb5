//! Giveaway winner selection and winner notification for a forum.
//!
//! - [`selection::pick_winners`] draws an unbiased subset of a candidate pool.
//! - [`format::format_winners`] renders the announcement text.
//! - [`dispatch::Dispatcher::send_all`] messages every winner, one at a time,
//!   with retries and a fixed delay between sends.
//!
//! Page scraping ([`scraper`]) and HTTP delivery ([`messenger`]) are thin
//! adapters around those three calls.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod messenger;
pub mod models;
pub mod scraper;
pub mod selection;
pub mod traits;
