//! Translate schema-builder expressions into JSON Schema documents, and
//! synthesize builder expressions from sample JSON.
pub mod cli;
pub mod codegen;
pub mod convert;
pub mod date;
pub mod error;
pub mod inference;
pub mod ir;
pub mod jq_exec;
pub mod lower;
pub mod parse;
pub mod path_de;

pub use convert::{convert, handle, handle_raw, ConvertRequest, ConvertResponse, Mode, Options, Output};
pub use error::ConvertError;
pub use ir::Node;
