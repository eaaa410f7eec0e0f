//! Domain types shared by every stage of the request pipeline.

mod entry;
mod policy;
mod request;
mod response;

pub use entry::{CacheEntry, CacheKey};
pub use policy::CachePolicy;
pub use request::RequestModel;
pub use response::ResponseModel;
