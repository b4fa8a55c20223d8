pub mod config;
pub mod dispatcher;
pub mod extractor;
pub mod fetcher;
pub mod progress;
pub mod request;
pub mod source;
