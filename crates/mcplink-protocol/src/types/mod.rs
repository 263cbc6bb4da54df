//! MCP domain types.
//!
//! Wire-faithful serde models for everything the protocol exchanges after the
//! JSON-RPC envelope is stripped. Field names follow the wire (camelCase via
//! serde renames); optional fields are omitted from output when `None`.

pub mod capabilities;
pub mod completion;
pub mod content;
pub mod core;
pub mod initialization;
pub mod logging;
pub mod prompts;
pub mod resources;
pub mod roots;
pub mod sampling;
pub mod tools;

pub use self::capabilities::*;
pub use self::completion::*;
pub use self::content::*;
pub use self::core::*;
pub use self::initialization::*;
pub use self::logging::*;
pub use self::prompts::*;
pub use self::resources::*;
pub use self::roots::*;
pub use self::sampling::*;
pub use self::tools::*;
