//! Contract registry
//!
//! A contract pairs a structural schema with an instruction preamble. The
//! set of contracts is fixed at compile time; schema documents are read from
//! their backing store on every call so that a deployment can edit them
//! without a rebuild.

use jsonschema::JSONSchema;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

/// General response contract
pub const GO_MODE_RESPONSE: &str = "go_mode_response";
/// Build variant with a code deliverable
pub const GO_MODE_CODE: &str = "go_mode_code";
/// Judge verdict shape
pub const JUDGE_OUTPUT: &str = "judge_output";
/// Proposed policy update shape
pub const POLICY_DIFF: &str = "policy_diff";

/// A registered contract
#[derive(Debug, Clone, Copy)]
pub struct Contract {
    /// Contract identifier
    pub id: &'static str,
    /// Instruction preamble sent as the system prompt
    pub system_prompt: &'static str,
    embedded_schema: &'static str,
}

impl Contract {
    /// Schema file name inside a contracts directory
    pub fn file_name(&self) -> String {
        format!("{}.schema.json", self.id)
    }
}

static CONTRACTS: &[Contract] = &[
    Contract {
        id: GO_MODE_RESPONSE,
        system_prompt: "You are operating in GO MODE.\n\
            Return ONLY valid JSON matching the GO MODE RESPONSE schema.\n\
            No markdown. No extra keys. Include 2-3 likely follow-ups.\n",
        embedded_schema: include_str!("../contracts/go_mode_response.schema.json"),
    },
    Contract {
        id: GO_MODE_CODE,
        system_prompt: "You are operating in GO MODE (BUILD VARIANT).\n\
            Return ONLY valid JSON matching the GO MODE CODE schema.\n\
            No markdown. No extra keys. Include a `deliverable` with file contents.\n\
            If you propose code, include it under deliverable.files[].content.\n",
        embedded_schema: include_str!("../contracts/go_mode_code.schema.json"),
    },
    Contract {
        id: JUDGE_OUTPUT,
        system_prompt: "You are a strict code reviewer judging a candidate solution.\n\
            Compare it with the reference solution and the test results.\n\
            Return ONLY valid JSON matching the JUDGE OUTPUT schema.\n\
            Use verdict \"fail\" if any test fails or behavior diverges from the reference.\n\
            List every distinct failure mode as a short phrase in failure_modes.\n",
        embedded_schema: include_str!("../contracts/judge_output.schema.json"),
    },
    Contract {
        id: POLICY_DIFF,
        system_prompt: "You maintain the learned policy of a coding agent.\n\
            Given the current learned policy and a failing judgement, propose new rules.\n\
            Return ONLY valid JSON matching the POLICY DIFF schema.\n\
            Every added rule must list the failure modes it addresses, verbatim.\n\
            Never repeat a rule that is already in the learned policy.\n",
        embedded_schema: include_str!("../contracts/policy_diff.schema.json"),
    },
];

/// Where schema documents are read from
#[derive(Debug, Clone)]
pub enum SchemaSource {
    /// Documents compiled into the binary
    Embedded,
    /// `<dir>/<contract_id>.schema.json`
    Directory(PathBuf),
}

/// Static registry of contracts
#[derive(Debug, Clone)]
pub struct ContractRegistry {
    source: SchemaSource,
}

impl Default for ContractRegistry {
    fn default() -> Self {
        Self::embedded()
    }
}

impl ContractRegistry {
    /// Registry backed by the schemas shipped with the crate
    pub fn embedded() -> Self {
        Self {
            source: SchemaSource::Embedded,
        }
    }

    /// Registry backed by a directory of schema documents
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            source: SchemaSource::Directory(dir.as_ref().to_path_buf()),
        }
    }

    /// Registry backed by `dir` when given, embedded schemas otherwise
    pub fn with_optional_dir(dir: Option<&Path>) -> Self {
        dir.map(Self::from_dir).unwrap_or_else(Self::embedded)
    }

    pub fn source(&self) -> &SchemaSource {
        &self.source
    }

    /// Look up a registered contract
    pub fn contract(&self, contract_id: &str) -> Result<&'static Contract> {
        CONTRACTS
            .iter()
            .find(|c| c.id == contract_id)
            .ok_or_else(|| CoreError::UnknownContract(contract_id.to_string()))
    }

    /// Identifiers of every registered contract
    pub fn contract_ids(&self) -> impl Iterator<Item = &'static str> {
        CONTRACTS.iter().map(|c| c.id)
    }

    /// Load the schema document for a contract
    pub fn load_schema(&self, contract_id: &str) -> Result<Value> {
        let contract = self.contract(contract_id)?;

        let raw = match &self.source {
            SchemaSource::Embedded => contract.embedded_schema.to_string(),
            SchemaSource::Directory(dir) => {
                let path = dir.join(contract.file_name());
                std::fs::read_to_string(&path).map_err(|e| CoreError::SchemaUnavailable {
                    contract_id: contract_id.to_string(),
                    message: format!("failed to read '{}': {}", path.display(), e),
                })?
            }
        };

        serde_json::from_str(&raw).map_err(|e| CoreError::SchemaUnavailable {
            contract_id: contract_id.to_string(),
            message: format!("invalid schema JSON: {}", e),
        })
    }

    /// Instruction preamble for a contract
    pub fn system_prompt_for(&self, contract_id: &str) -> Result<&'static str> {
        Ok(self.contract(contract_id)?.system_prompt)
    }

    /// Load and compile the schema for a contract
    pub fn compile(&self, contract_id: &str) -> Result<ContractSchema> {
        let schema = self.load_schema(contract_id)?;
        ContractSchema::compile(contract_id, &schema)
    }
}

/// A compiled contract schema
pub struct ContractSchema {
    contract_id: String,
    compiled: JSONSchema,
}

impl std::fmt::Debug for ContractSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractSchema")
            .field("contract_id", &self.contract_id)
            .finish_non_exhaustive()
    }
}

impl ContractSchema {
    /// Compile a schema document
    pub fn compile(contract_id: &str, schema: &Value) -> Result<Self> {
        let compiled = JSONSchema::compile(schema).map_err(|e| CoreError::SchemaUnavailable {
            contract_id: contract_id.to_string(),
            message: format!("schema does not compile: {}", e),
        })?;

        Ok(Self {
            contract_id: contract_id.to_string(),
            compiled,
        })
    }

    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }

    /// Validate an instance, returning every violation joined into one message
    pub fn validate(&self, instance: &Value) -> std::result::Result<(), String> {
        match self.compiled.validate(instance) {
            Ok(()) => Ok(()),
            Err(errors) => {
                let messages: Vec<String> = errors
                    .map(|e| {
                        let path = e.instance_path.to_string();
                        if path.is_empty() {
                            e.to_string()
                        } else {
                            format!("{}: {}", path, e)
                        }
                    })
                    .collect();
                Err(messages.join("; "))
            }
        }
    }
}
