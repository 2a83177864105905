//! Request dispatch: raw text plus a mode in, a conversion result out.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConvertError, Result};

pub const DEFAULT_MAX_DEPTH: usize = 100;
pub const DEFAULT_INDENT: usize = 2;

/// Knobs shared by every conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Deepest nesting accepted, counting the root as depth 1.
    pub max_depth: usize,
    /// Spaces per nested object level in synthesized source.
    pub indent: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH, indent: DEFAULT_INDENT }
    }
}

/// Which direction a conversion runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// builder source → JSON Schema
    #[serde(alias = "zod")]
    Builder,
    /// JSON sample → builder source
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Schema(Value),
    Builder(String),
}

/// Run one conversion.
pub fn convert(code: &str, mode: Mode, opts: &Options) -> Result<Output> {
    if code.trim().is_empty() {
        return Err(ConvertError::InvalidRequest("no code to convert".into()));
    }
    match mode {
        Mode::Builder => builder_to_schema(code, opts).map(Output::Schema),
        Mode::Json => json_to_builder(code, opts).map(Output::Builder),
    }
}

pub fn builder_to_schema(src: &str, opts: &Options) -> Result<Value> {
    let node = crate::parse::parse_builder(src, opts)?;
    tracing::debug!(kind = node.kind_name(), "parsed builder source");
    crate::lower::to_json_schema(&node, opts)
}

pub fn json_to_builder(text: &str, opts: &Options) -> Result<String> {
    let sample = parse_json(text)?;
    crate::inference::synthesize(&sample, opts)
}

/// Parse sample text, reporting syntax errors as [`ConvertError::InvalidJsonInput`].
pub fn parse_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| ConvertError::InvalidJsonInput(e.to_string()))
}

// ------------------------------ Envelope --------------------------------- //

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub code: String,
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertResponse {
    pub status: u16,
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Schema { schema: Value },
    Code {
        #[serde(rename = "zodCode")]
        code: String,
    },
    Error { message: String, kind: String },
}

impl ConvertResponse {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    fn failure(err: &ConvertError) -> Self {
        Self {
            status: err.status(),
            body: ResponseBody::Error { message: err.to_string(), kind: err.kind().to_string() },
        }
    }
}

/// Handle a decoded request. Every failure becomes an error response.
pub fn handle(request: &ConvertRequest, opts: &Options) -> ConvertResponse {
    match convert(&request.code, request.mode, opts) {
        Ok(Output::Schema(schema)) => ConvertResponse { status: 200, body: ResponseBody::Schema { schema } },
        Ok(Output::Builder(code)) => ConvertResponse { status: 200, body: ResponseBody::Code { code } },
        Err(err) => {
            tracing::debug!(kind = err.kind(), mode = ?request.mode, "conversion failed: {err}");
            ConvertResponse::failure(&err)
        }
    }
}

/// Handle a request envelope given as JSON text.
pub fn handle_raw(body: &str, opts: &Options) -> ConvertResponse {
    match crate::path_de::from_str_with_path::<ConvertRequest>(body) {
        Ok(request) => handle(&request, opts),
        Err(message) => {
            tracing::debug!("rejected request envelope: {message}");
            ConvertResponse::failure(&ConvertError::InvalidRequest(message))
        }
    }
}
