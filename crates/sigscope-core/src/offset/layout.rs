//! Memory layout of the structures read once offsets are resolved.
//!
//! Defaults for [`SessionLayout`]; a signature table can override every value
//! when the target's build shifts them.

use serde::{Deserialize, Serialize};

use crate::memory::TextEncoding;

/// Offsets inside the data-model root object
pub mod data_model {
    /// Pointer to the root, relative to the resolved `data_model` global
    pub const ROOT_POINTER: u64 = 0x8;
    /// u64 numeric id of the joined session (0 while in menus)
    pub const SESSION_ID: u64 = 0x1A0;
    /// Length-prefixed UTF-8 session name
    pub const SESSION_NAME: u64 = 0x1B0;
    /// u8, non-zero once the session finished loading
    pub const LOADED_FLAG: u64 = 0x5F8;
}

/// Where the session markers live relative to a resolved field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLayout {
    /// Resolved field the chain starts from
    pub root_field: String,
    /// Pointer chain from the field address to the data-model root
    pub root_chain: Vec<u64>,
    pub session_id: u64,
    pub session_name: u64,
    pub name_encoding: TextEncoding,
    pub loaded_flag: Option<u64>,
}

impl Default for SessionLayout {
    fn default() -> Self {
        Self {
            root_field: "data_model".to_string(),
            root_chain: vec![0, data_model::ROOT_POINTER],
            session_id: data_model::SESSION_ID,
            session_name: data_model::SESSION_NAME,
            name_encoding: TextEncoding::Utf8,
            loaded_flag: Some(data_model::LOADED_FLAG),
        }
    }
}
