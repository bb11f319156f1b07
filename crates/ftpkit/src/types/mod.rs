//! FTP protocol types.

mod response;
mod status;

pub use response::Response;
pub use status::StatusCode;
