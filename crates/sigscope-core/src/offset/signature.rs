use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::offset::SessionLayout;
use crate::scan::Signature;

/// How a field address is derived from a signature match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AddressMode {
    /// The match itself
    #[default]
    Direct,
    /// x64 `[rip + disp32]` operand of an instruction inside the match
    RipRelative {
        instr_offset: usize,
        disp_offset: usize,
        instr_len: usize,
    },
    /// A 64-bit absolute address embedded at `disp_offset` in the match
    Absolute { disp_offset: usize },
}

/// A second pattern that must occur near a match for it to count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub pattern: Signature,
    pub max_distance: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSignature {
    pub pattern: Signature,
    #[serde(default)]
    pub mode: AddressMode,
    #[serde(default)]
    pub deref: bool,
    #[serde(default)]
    pub addend: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Anchor>,
}

impl CodeSignature {
    pub fn new(pattern: Signature) -> Self {
        Self {
            pattern,
            mode: AddressMode::Direct,
            deref: false,
            addend: 0,
            anchor: None,
        }
    }

    pub fn rip_relative(mut self, instr_offset: usize, disp_offset: usize, instr_len: usize) -> Self {
        self.mode = AddressMode::RipRelative {
            instr_offset,
            disp_offset,
            instr_len,
        };
        self
    }

    pub fn absolute(mut self, disp_offset: usize) -> Self {
        self.mode = AddressMode::Absolute { disp_offset };
        self
    }

    pub fn deref(mut self) -> Self {
        self.deref = true;
        self
    }

    pub fn addend(mut self, addend: i64) -> Self {
        self.addend = addend;
        self
    }

    pub fn anchor(mut self, pattern: Signature, max_distance: usize) -> Self {
        self.anchor = Some(Anchor {
            pattern,
            max_distance,
        });
        self
    }
}

/// Which mapped regions a field is searched in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    #[default]
    Code,
    Data,
    Any,
}

impl RegionKind {
    pub fn accepts(self, executable: bool) -> bool {
        match self {
            Self::Code => executable,
            Self::Data => !executable,
            Self::Any => true,
        }
    }
}

fn default_required() -> bool {
    true
}

/// One logical field and the signatures that locate it, tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetSignatureEntry {
    pub name: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub region: RegionKind,
    pub signatures: Vec<CodeSignature>,
}

/// Versioned signature table for one build family of the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureTable {
    pub version: String,
    pub entries: Vec<OffsetSignatureEntry>,
    #[serde(default)]
    pub session: SessionLayout,
}

impl SignatureTable {
    pub fn entry(&self, name: &str) -> Option<&OffsetSignatureEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|entry| entry.required)
            .map(|entry| entry.name.as_str())
    }
}

pub fn load_signatures<P: AsRef<Path>>(path: P) -> Result<SignatureTable> {
    let content = fs::read_to_string(&path)?;
    let data = serde_json::from_str(&content)?;
    Ok(data)
}

pub fn save_signatures<P: AsRef<Path>>(path: P, signatures: &SignatureTable) -> Result<()> {
    let content = serde_json::to_string_pretty(signatures)?;
    fs::write(path, content)?;
    Ok(())
}

/// Signature table shipped with the crate.
pub fn builtin_signatures() -> Result<SignatureTable> {
    let sig = Signature::parse;
    Ok(SignatureTable {
        version: "builtin-2026.10".to_string(),
        entries: vec![
            OffsetSignatureEntry {
                name: "script_context".to_string(),
                required: true,
                region: RegionKind::Code,
                signatures: vec![
                    // lea rcx, [rip+disp32]; call ...; mov rbx, rax; test rax, rax
                    CodeSignature::new(sig("48 8D 0D ?? ?? ?? ?? E8 ?? ?? ?? ?? 48 8B D8 48 85 C0")?)
                        .rip_relative(0, 3, 7),
                    CodeSignature::new(sig("48 8D 15 ?? ?? ?? ?? 48 8B CB E8 ?? ?? ?? ?? 84 C0")?)
                        .rip_relative(0, 3, 7),
                ],
            },
            OffsetSignatureEntry {
                name: "interpreter_state".to_string(),
                required: true,
                region: RegionKind::Code,
                signatures: vec![
                    // mov rax, [rip+disp32]; test rax, rax; jz short
                    CodeSignature::new(sig("48 8B 05 ?? ?? ?? ?? 48 85 C0 74 ?? 48 8B 48 ??")?)
                        .rip_relative(0, 3, 7),
                ],
            },
            OffsetSignatureEntry {
                name: "data_model".to_string(),
                required: true,
                region: RegionKind::Code,
                signatures: vec![
                    // mov rcx, [rip+disp32]; test rcx, rcx; jz short; mov rax, [rcx]; call [rax+..]
                    CodeSignature::new(sig("48 8B 0D ?? ?? ?? ?? 48 85 C9 74 ?? 48 8B 01 FF 50 ??")?)
                        .rip_relative(0, 3, 7)
                        // mov dword [rsp+..], 10000 appears right after the accessor
                        .anchor(sig("C7 44 24 ?? 10 27 00 00")?, 0x80),
                ],
            },
            OffsetSignatureEntry {
                name: "task_scheduler".to_string(),
                required: false,
                region: RegionKind::Code,
                signatures: vec![
                    // call rel32 into the scheduler getter; target is the getter itself
                    CodeSignature::new(sig("E8 ?? ?? ?? ?? 48 8B 8B ?? ?? ?? ?? 48 85 C9 0F 84")?)
                        .rip_relative(0, 1, 5),
                ],
            },
        ],
        session: SessionLayout::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_table_is_consistent() {
        let table = builtin_signatures().unwrap();
        assert!(!table.version.is_empty());
        assert!(table.entry("DATA_MODEL").is_some());
        assert!(table.entry(&table.session.root_field).is_some());

        let required: Vec<&str> = table.required_fields().collect();
        assert_eq!(
            required,
            vec!["script_context", "interpreter_state", "data_model"]
        );
        assert!(table.entries.iter().all(|e| !e.signatures.is_empty()));
    }

    #[test]
    fn test_signatures_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let table = builtin_signatures().unwrap();
        save_signatures(temp_file.path(), &table).unwrap();

        let loaded = load_signatures(temp_file.path()).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let json = r#"{
            "version": "custom",
            "entries": [
                { "name": "data_model", "signatures": [ { "pattern": "48 8B 0D ?? ?? ?? ??" } ] }
            ]
        }"#;
        let table: SignatureTable = serde_json::from_str(json).unwrap();
        let entry = table.entry("data_model").unwrap();
        assert!(entry.required);
        assert_eq!(entry.region, RegionKind::Code);
        assert_eq!(entry.signatures[0].mode, AddressMode::Direct);
        assert_eq!(table.session, SessionLayout::default());
    }

    #[test]
    fn test_address_mode_json_shape() {
        let sig = CodeSignature::new(Signature::parse("48 8D 0D ?? ?? ?? ??").unwrap())
            .rip_relative(0, 3, 7);
        let json = serde_json::to_value(&sig).unwrap();
        assert_eq!(json["mode"]["kind"], "rip_relative");
        assert_eq!(json["mode"]["instr_len"], 7);
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let err = load_signatures("/nonexistent/signatures.json").unwrap_err();
        assert!(err.is_not_found());
    }
}
