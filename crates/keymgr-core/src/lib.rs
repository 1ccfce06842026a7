#![deny(missing_docs)]

//! # keymgr-core — Key Model Primitives
//!
//! Leaf crate of the keymgr workspace. It defines the vocabulary every other
//! crate speaks: the closed algorithm enumerations, the key capability model,
//! the execution context handed to remote dispatch, descriptive tags, and the
//! error taxonomy. It performs no cryptography.
//!
//! ## Key Design Principles
//!
//! 1. **Closed enumerations, one lookup table.** `SignAlgorithm`,
//!    `HashAlgorithm` and `Cipher` are exhaustive enums with an immutable
//!    `ALL` table. String identifiers are parsed at the boundary; an unknown
//!    identifier is `KeyError::UnsupportedAlgorithm`, never a panic.
//!
//! 2. **Validated attributes.** `KeyAttributes` cannot exist with an empty
//!    usage set or a key size outside its type's allowed list, whether built
//!    in code or deserialized from a descriptor.
//!
//! 3. **One compatibility matrix.** `can_sign` / `can_verify` require both
//!    the matching usage and a matching algorithm family. `check_*` variants
//!    say which of the two failed.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `keymgr-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.
//! - Identifier enums, `KeyAttributes` and `Meta` implement
//!   `Serialize`/`Deserialize` using their wire identifiers.

pub mod algorithm;
pub mod capability;
pub mod context;
pub mod error;
pub mod meta;

// Re-export primary types for ergonomic imports.
pub use algorithm::{Cipher, HashAlgorithm, RsaPadding, SignAlgorithm, SignFamily};
pub use capability::{KeyAttributes, KeyType, KeyUsage};
pub use context::{ConfigType, ServiceContext};
pub use error::{KeyError, RemoteError};
pub use meta::{Meta, MetaName};
