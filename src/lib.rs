//! Format-preserving editing of OpenSSH client configuration files.
//!
//! Text goes through [`parse`] into a [`Config`] of [`Host`] blocks, is
//! edited through the host mutation API or an [`EditSession`], and comes
//! back out through [`serialize`]. Unedited content round-trips byte for
//! byte. [`Persister`] handles backups and atomic, verified writes.

pub mod directives;
pub mod error;
pub mod model;
pub mod parser;
pub mod persist;
pub mod serializer;
pub mod session;
pub mod ssh;
pub mod tracker;
pub mod validate;

pub use error::{ConfigError, ParseError, Result};
pub use model::{Config, Host, SshOption};
pub use parser::{parse, parse_file, parse_host};
pub use persist::{Persister, WriteReport, write};
pub use serializer::{serialize, serialize_host};
pub use session::{DefaultPolicy, EditSession, Field, FieldError};
pub use tracker::{LineMark, OpTag, Opcode, diff, line_marks};
pub use validate::{ValidationWarning, validate};
