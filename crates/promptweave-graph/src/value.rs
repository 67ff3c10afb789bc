//! Value kind tags and literal conversions.
//!
//! The host stores slot kinds as plain string tags. Everything here
//! validates those tags into closed enums at the parameter-read boundary
//! so that an unrecognized tag fails fast instead of deep in processing.

use std::str::FromStr;

use serde_json::Value;
use strum::EnumString;

use crate::error::{CompileError, CompileResult};

/// Smallest big-integer literal the remote engine can process.
pub const BIG_INT_MIN: i128 = i64::MIN as i128;

/// Largest big-integer literal the remote engine can process.
pub const BIG_INT_MAX: i128 = i64::MAX as i128;

/// Declared kind of a compile-unit input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Plain integer literal.
    Int,
    /// Integer carried as text because the host parameter system cannot
    /// represent the full 64-bit range exactly.
    BigInt,
    /// Floating point literal.
    Float,
    /// Text literal, optionally coerced per [`ConvertKind`].
    Text,
    /// Boolean literal.
    Bool,
    /// Wired to the compile unit's input connector with this index.
    Wire(usize),
}

impl SlotKind {
    /// Validates a raw kind tag.
    ///
    /// Wire tags are `"input{N}"` with a 1-based connector number.
    pub fn parse(tag: &str) -> CompileResult<Self> {
        if let Some(number) = tag.strip_prefix("input") {
            let index: usize = number.parse().map_err(|_| CompileError::UnknownValueKind {
                tag: tag.to_string(),
            })?;
            if index == 0 {
                return Err(CompileError::UnknownValueKind {
                    tag: tag.to_string(),
                });
            }
            return Ok(Self::Wire(index - 1));
        }
        match tag {
            "int" => Ok(Self::Int),
            "textint" => Ok(Self::BigInt),
            "float" => Ok(Self::Float),
            "text" => Ok(Self::Text),
            "bool" => Ok(Self::Bool),
            _ => Err(CompileError::UnknownValueKind {
                tag: tag.to_string(),
            }),
        }
    }
}

/// Coercion target declared on a text slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ConvertKind {
    /// Parse as integer.
    Int,
    /// Parse as float.
    Float,
    /// Keep as text.
    #[default]
    Text,
    /// Coerce to boolean.
    Bool,
}

impl ConvertKind {
    /// Validates a raw conversion tag; a missing tag keeps the text as is.
    pub fn parse(tag: Option<&str>) -> CompileResult<Self> {
        match tag {
            None | Some("") => Ok(Self::Text),
            Some(raw) => Self::from_str(raw).map_err(|_| CompileError::UnknownConversion {
                tag: raw.to_string(),
            }),
        }
    }

    /// Applies the coercion to a text literal.
    pub fn apply(&self, text: &str) -> CompileResult<Value> {
        match self {
            Self::Int => {
                let value: i64 =
                    text.trim()
                        .parse()
                        .map_err(|_| CompileError::InvalidConversion {
                            text: text.to_string(),
                            target: "int",
                        })?;
                Ok(Value::from(value))
            }
            Self::Float => {
                let value: f64 =
                    text.trim()
                        .parse()
                        .map_err(|_| CompileError::InvalidConversion {
                            text: text.to_string(),
                            target: "float",
                        })?;
                Ok(Value::from(value))
            }
            Self::Text => Ok(Value::from(text)),
            Self::Bool => {
                let truthy = !text.is_empty() && text != "0" && !text.eq_ignore_ascii_case("false");
                Ok(Value::from(truthy))
            }
        }
    }
}

/// Declared value kind of a wired raw source, selecting the loader
/// template appended for its upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlotValueKind {
    /// Load the upload as an image. The empty tag also means image, kept
    /// compatible with older node declarations.
    #[default]
    Image,
    /// Load the upload and convert it to a mask.
    Mask,
}

impl SlotValueKind {
    /// Validates a raw value kind tag.
    pub fn parse(tag: &str) -> CompileResult<Self> {
        match tag {
            "" | "IMAGE" => Ok(Self::Image),
            "MASK" => Ok(Self::Mask),
            _ => Err(CompileError::UnsupportedValueKind {
                tag: tag.to_string(),
            }),
        }
    }
}

/// Declared output type of a compile-unit output, selecting the save
/// template the aggregator appends for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputType {
    /// Plain image output. The empty tag also means image.
    #[default]
    Image,
    /// Mask output, converted to an image before saving.
    Mask,
    /// Mesh asset output.
    Mesh,
    /// Textured mesh output, exported then previewed as an image.
    TriMesh,
    /// String output, rendered into an image by the companion extension.
    Text,
}

impl OutputType {
    /// Validates a raw output type tag.
    pub fn parse(tag: &str) -> CompileResult<Self> {
        match tag {
            "" | "IMAGE" => Ok(Self::Image),
            "MASK" => Ok(Self::Mask),
            "MESH" => Ok(Self::Mesh),
            "TRIMESH" => Ok(Self::TriMesh),
            "STRING" => Ok(Self::Text),
            _ => Err(CompileError::UnsupportedSaveType {
                tag: tag.to_string(),
            }),
        }
    }
}

/// Range-checks a big-integer literal and narrows it for the job graph.
pub fn check_big_int(value: i128) -> CompileResult<i64> {
    if !(BIG_INT_MIN..=BIG_INT_MAX).contains(&value) {
        return Err(CompileError::IntOutOfRange { value });
    }
    Ok(value as i64)
}
