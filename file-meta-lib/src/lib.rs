// Name -> inode bookkeeping with hard-link counts, served over a small REST api.
// Store (sqlite) <- service (link/unlink rules) <- http_api (warp) ; client is the reqwest side.

mod client;
mod error;
pub mod http_api;
mod record;
pub mod service;
mod store;
mod store_db;

pub use client::*;
pub use error::*;
pub use http_api::file_meta_routes;
pub use record::*;
pub use service::FileMetaService;
pub use store::*;
pub use store_db::*;
