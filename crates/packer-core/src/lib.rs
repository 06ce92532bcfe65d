pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod hash;
pub mod node;
pub mod paths;
pub mod stage;
pub mod traits;

pub use cache::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use node::*;
pub use stage::*;
pub use traits::*;
