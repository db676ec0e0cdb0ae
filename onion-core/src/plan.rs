use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::codec::ArchiveFormat;
use crate::container::manifest::Manifest;
use crate::crypto::password::generate_password;
use crate::domain::{LayerSpec, ManifestEntry, PasswordToken, TaskId};
use crate::error::{Result, invalid};
use crate::policy::Policy;

/// Which layers get a generated password.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionPolicy {
    OddLayers,
    Manual(BTreeSet<u32>),
}

impl EncryptionPolicy {
    fn wants_password(&self, index: u32) -> bool {
        match self {
            EncryptionPolicy::OddLayers => index % 2 == 1,
            EncryptionPolicy::Manual(set) => set.contains(&index),
        }
    }
}

/// Every `interval`-th layer is locked with a caller-held secret instead of a
/// generated one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MasterPolicy {
    #[serde(skip_serializing, default)]
    pub password: String,
    pub interval: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanRequest {
    pub iterations: u32,
    /// Rotated round-robin across layers.
    pub formats: Vec<ArchiveFormat>,
    pub encryption: EncryptionPolicy,
    /// `None` means the master policy is disabled.
    pub master: Option<MasterPolicy>,
}

impl PlanRequest {
    pub fn validate(&self, policy: &Policy) -> Result<()> {
        if self.iterations < 1 {
            return Err(invalid("iterations must be at least 1"));
        }
        if self.iterations > policy.max_iterations {
            return Err(invalid(format!(
                "iterations must not exceed {}",
                policy.max_iterations
            )));
        }
        if self.formats.is_empty() {
            return Err(invalid("format list must not be empty"));
        }
        if let Some(m) = &self.master {
            if m.interval < 1 {
                return Err(invalid("master password interval must be at least 1"));
            }
            if m.password.is_empty() {
                return Err(invalid("master password is enabled but empty"));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Plan {
    pub layers: Vec<LayerSpec>,
    pub manifest: Manifest,
}

pub fn layer_filename(task: &TaskId, index: u32, format: ArchiveFormat) -> String {
    format!("{task}_layer_{index}{}", format.extension())
}

/// Decides format and password for layers 1..=N. Priority: master interval,
/// then the encryption policy; a format that cannot carry a password always
/// ends up with none.
pub fn plan(req: &PlanRequest, task: &TaskId, policy: &Policy) -> Result<Plan> {
    req.validate(policy)?;

    let n = req.iterations as usize;
    let mut layers = Vec::with_capacity(n);
    let mut entries = Vec::with_capacity(n);

    for index in 1..=req.iterations {
        let format = req.formats[(index as usize - 1) % req.formats.len()];
        let master = req
            .master
            .as_ref()
            .filter(|m| index % m.interval == 0);

        let (password, token) = if !format.supports_password() {
            (None, PasswordToken::None)
        } else if let Some(m) = master {
            (Some(m.password.clone()), PasswordToken::Master)
        } else if req.encryption.wants_password(index) {
            let pw = generate_password();
            (Some(pw.clone()), PasswordToken::Explicit(pw))
        } else {
            (None, PasswordToken::None)
        };

        entries.push(ManifestEntry {
            index,
            archive_filename: layer_filename(task, index, format),
            password: token,
        });
        layers.push(LayerSpec {
            index,
            format,
            password,
        });
    }

    Ok(Plan {
        layers,
        manifest: Manifest::new(entries),
    })
}
