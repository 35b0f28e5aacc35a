pub mod cache;
pub mod cloudapi;
pub mod uazapi;

pub use cache::ClientCache;
pub use cloudapi::CloudApiAdapter;
pub use uazapi::UazapiAdapter;
