//! Command implementations for OxiZip CLI.

pub mod create;
pub mod extract;
pub mod info;
pub mod list;
pub mod test;

pub use create::{CompressionArg, CreateOptions, EncryptionArg, NamePolicyArg, cmd_create};
pub use extract::{ExtractArgs, OverwriteArg, cmd_extract};
pub use info::cmd_info;
pub use list::{ListOptions, cmd_list};
pub use test::cmd_test;
