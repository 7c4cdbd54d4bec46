/// Catalog and rate schedule loaders.
pub mod catalog;
/// CSV export of dispatched series.
pub mod export;
/// CSV load-profile import.
pub mod import;
