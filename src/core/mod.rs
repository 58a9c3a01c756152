mod differ;
mod engine;
mod fetcher;
mod normalizer;
mod notifier;
mod report;
mod store;
mod url_list;

pub use differ::ContentDiffer;
pub use fetcher::{FetchError, FetchOptions, HttpFetcher, PageFetcher};
pub use normalizer::{normalize_html, Fingerprint};
pub use notifier::{Notifier, SmtpNotifier, StdoutNotifier};
pub use report::{Outcome, RunReport, UnchangedReason};
pub use store::ContentStore;
pub use url_list::load_url_list;

// Export the main engine
pub use engine::{Engine, RunOptions};
