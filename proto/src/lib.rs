pub mod attachment;
pub mod changes;
pub mod collection;
pub mod document;
pub mod error;
pub mod id;
pub mod message;
pub mod revision;
pub mod state;

pub use attachment::*;
pub use changes::*;
pub use collection::*;
pub use document::*;
pub use error::*;
pub use id::*;
pub use message::*;
pub use revision::*;
pub use state::*;
