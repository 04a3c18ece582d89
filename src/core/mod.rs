pub mod download;
pub mod fast_list;

pub use crate::domain::model::{ListPage, ListRequest, ListingReport, ObjectEntry};
pub use crate::domain::ports::{ObjectStore, Storage};
pub use crate::utils::error::Result;
