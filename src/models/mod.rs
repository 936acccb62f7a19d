pub mod context;
pub mod predicate;
pub mod query;
pub mod schema;
pub mod value;
