pub mod fallback;
pub mod http;
pub mod records;
pub mod remote;
pub mod seed;
pub mod storage;
pub mod token_store;

pub use fallback::LocalFallbackStore;
pub use http::HttpClient;
pub use remote::HttpLibrary;
pub use seed::{DemoSeed, NoSeed};
pub use storage::{FileStorage, MemoryStorage};
pub use token_store::TokenStore;
