//! Incremental, pull-based JSON parser.
//!
//! A document is parsed in one forward pass over a [`Tokenator`]. Compound
//! nodes are handed to the caller before their contents have arrived; pulling
//! a child advances the shared cursor, and a child the caller abandons is
//! drained (and retained) when its next sibling is requested.
//!
//! ```
//! use command_chain::json_stream::JsonNode;
//!
//! let root = JsonNode::parse_fragments(vec!["{\"commands\": [", "1, 2]}"]).unwrap();
//! let commands = root.as_object().unwrap().get("commands").unwrap().unwrap();
//! assert_eq!(commands.to_json_text().unwrap(), "[1, 2]");
//! ```

pub mod array;
pub mod chunks;
pub mod error;
pub mod node;
pub mod object;
pub mod string;
pub mod tokenator;

pub use array::JsonArray;
pub use chunks::NodeChunks;
pub use error::JsonStreamError;
pub use node::{JsonBoolean, JsonNode, JsonNull, JsonNumber, NodeType};
pub use object::JsonObject;
pub use string::JsonString;
pub use tokenator::{ChunkSource, Tokenator};
