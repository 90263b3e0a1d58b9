pub mod sync_client;

pub use sync_client::HttpSyncClient;
