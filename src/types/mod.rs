//! Data types shared by the cache, scheduler and data source.

mod query;
mod request;
mod row;
mod state;

pub use query::*;
pub use request::*;
pub use row::*;
pub use state::*;
