//! Scalar argument model
//!
//! Every message this system exchanges carries at most one scalar argument.

use serde::{Deserialize, Serialize};

/// A single OSC scalar argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OscArg {
    /// 32-bit float
    Float(f32),
    /// 32-bit integer
    Int(i32),
    /// Boolean value
    Bool(bool),
    /// UTF-8 string
    Text(String),
}

impl OscArg {
    /// Get as float, widening if necessary
    pub fn as_float(&self) -> Option<f32> {
        match self {
            OscArg::Float(v) => Some(*v),
            OscArg::Int(v) => Some(*v as f32),
            OscArg::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            OscArg::Text(_) => None,
        }
    }

    /// Get as int, converting if necessary
    pub fn as_int(&self) -> Option<i32> {
        match self {
            OscArg::Int(v) => Some(*v),
            OscArg::Float(v) => Some(*v as i32),
            OscArg::Bool(v) => Some(if *v { 1 } else { 0 }),
            OscArg::Text(_) => None,
        }
    }

    /// Get as bool, converting if necessary
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OscArg::Bool(v) => Some(*v),
            OscArg::Int(v) => Some(*v != 0),
            OscArg::Float(v) => Some(*v != 0.0),
            OscArg::Text(_) => None,
        }
    }

    /// Get as text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            OscArg::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Whether the argument is textual
    pub fn is_text(&self) -> bool {
        matches!(self, OscArg::Text(_))
    }
}

impl From<f32> for OscArg {
    fn from(v: f32) -> Self {
        OscArg::Float(v)
    }
}

impl From<i32> for OscArg {
    fn from(v: i32) -> Self {
        OscArg::Int(v)
    }
}

impl From<bool> for OscArg {
    fn from(v: bool) -> Self {
        OscArg::Bool(v)
    }
}

impl From<String> for OscArg {
    fn from(v: String) -> Self {
        OscArg::Text(v)
    }
}

impl From<&str> for OscArg {
    fn from(v: &str) -> Self {
        OscArg::Text(v.to_string())
    }
}
