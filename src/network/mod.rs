//! Upload path to the ingest server

pub mod connector;
pub mod handshake;
pub mod uploader;

pub use connector::{Connector, IcecastConnector};
pub use handshake::{check_response, SourceRequest};
pub use uploader::{SessionState, UploadSession, UploadSettings, UploadSnapshot, UploadStats, Uploader};
