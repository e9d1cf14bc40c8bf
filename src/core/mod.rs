pub mod error;
pub mod types;
pub mod value;

pub use error::{Result, ShardingError, StoreError, StoreResult};
pub use types::{Column, ForeignKey, Row, Schema};
pub use value::{DataType, Value};
