//! Document side of the query engine
//!
//! - `compiler` lowers compiled queries to MongoDB-style filter and
//!   update documents
//! - `object_id` maps BSON ObjectIds to and from extended JSON
//! - `collection`, `query` and `storage` execute those documents in memory

pub mod collection;
pub mod compiler;
pub mod object_id;
pub mod query;
pub mod storage;

pub use collection::{Collection, Document};
pub use compiler::{
    paginate_pipeline, BulkUpdate, DocumentCompiler, DocumentOperation, ID_KEY, UPDATE_OPERATORS,
};
pub use bson::oid::ObjectId;
pub use object_id::{oid_from_json, oid_to_json, parse_object_id, IdentifierCodec, ObjectIdCodec};
pub use query::matches;
pub use storage::MemoryCollection;
