//! Converts finite element models written as Abaqus `.inp` input decks into
//! OpenSeesPy scripts.
//!
//! The pipeline is `parse` → `convert` → `render`: text becomes a validated
//! [`Model`], the model is translated through the [`MappingTables`] into a
//! [`CommandSequence`], and the sequence is rendered as script text.

pub mod batch;
pub mod commands;
pub mod datatypes;
pub mod error;
pub mod mapping;
pub mod parser;
pub mod renderer;
pub mod translator;

pub use commands::{Arg, Block, BlockKind, Command, CommandSequence};
pub use datatypes::{ElementType, Model};
pub use error::{ConversionError, ConverterError, ParseError, ParseErrorKind, TableError};
pub use mapping::{Lookup, MappingTables};
pub use parser::parse;
pub use renderer::render;
pub use translator::{convert, convert_with, ConvertOptions, UnmappedPolicy, Warning};
