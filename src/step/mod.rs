pub mod fields;
pub mod form;
pub mod kind;
pub mod schema;

pub use fields::*;
pub use form::*;
pub use kind::*;
pub use schema::*;
