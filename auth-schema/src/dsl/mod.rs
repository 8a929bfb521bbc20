//! Codec between serialized schema definitions and their typed form.
//!
//! The storage core never interprets definition bytes itself; it goes
//! through a [`DefinitionParser`]. [`DslParser`] is the default
//! implementation, reading and writing the schema language:
//!
//! ```text
//! entity user {}
//!
//! entity organization {
//!     relation admin @user
//!     relation member @user @team#member
//!     attribute credit integer
//!     permission manage = admin or (member and check_credit(credit))
//! }
//!
//! rule check_credit(credit integer) { credit > 5000 }
//! ```

pub mod parser;
pub mod printer;

use crate::models::ParsedDefinition;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ParseError(pub String);

/// Compiler boundary used by the reader and the flattening path
pub trait DefinitionParser: Send + Sync {
    /// Parse one serialized definition. Anything other than exactly one
    /// entity or rule is an error.
    fn parse(&self, serialized: &[u8]) -> Result<ParsedDefinition, ParseError>;

    /// Parse a whole schema document into its top-level definitions
    fn parse_source(&self, source: &str) -> Result<Vec<ParsedDefinition>, ParseError>;

    fn serialize(&self, definition: &ParsedDefinition) -> Vec<u8>;
}

/// Schema language parser
#[derive(Debug, Clone, Copy, Default)]
pub struct DslParser;

impl DslParser {
    pub fn new() -> Self {
        Self
    }
}

impl DefinitionParser for DslParser {
    fn parse(&self, serialized: &[u8]) -> Result<ParsedDefinition, ParseError> {
        let source = std::str::from_utf8(serialized)
            .map_err(|e| ParseError(format!("Definition is not valid UTF-8: {}", e)))?;
        parser::parse_single(source)
    }

    fn parse_source(&self, source: &str) -> Result<Vec<ParsedDefinition>, ParseError> {
        parser::parse_document(source)
    }

    fn serialize(&self, definition: &ParsedDefinition) -> Vec<u8> {
        printer::print_definition(definition).into_bytes()
    }
}
