pub mod domain;
pub mod ports;
pub mod validation;

pub use domain::{AuthGrant, Document, LastUpload, Note, UploadFile, User, PDF_MIME_TYPE};
pub use ports::{KeyValueStorage, LibraryService, PortError, PortResult, SeedProvider};
pub use validation::{ValidationError, MAX_UPLOAD_BYTES};
