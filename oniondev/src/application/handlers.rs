use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use onion_core::domain::TaskResult;
use onion_core::error::{OnionError, Result};
use onion_core::{
    BlobStore, EncryptionPolicy, EngineConfig, FsBlobStore, Manifest, MasterPolicy,
    MemoryTaskStore, PlanRequest, Runner, Submitted, TaskId, TaskOutcome, TaskSnapshot,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::presentation::cli::{EncryptMode, PlanArgs};

/// Options shared by every subcommand.
pub struct Settings {
    pub work_dir: Option<PathBuf>,
    pub workers: Option<usize>,
}

struct Session {
    runner: Runner,
    blobs: Arc<FsBlobStore>,
}

impl Settings {
    fn config(&self) -> Result<EngineConfig> {
        let mut cfg = EngineConfig::from_env()?;
        if let Some(dir) = &self.work_dir {
            cfg.work_dir = dir.clone();
        }
        if let Some(n) = self.workers {
            if n == 0 {
                return Err(OnionError::Validation("--workers must be at least 1".into()));
            }
            cfg.max_concurrent_tasks = n;
        }
        Ok(cfg)
    }

    fn session(&self) -> Result<Session> {
        let config = self.config()?;
        let blobs = Arc::new(FsBlobStore::new(&config.blobs_dir())?);
        let store = Arc::new(MemoryTaskStore::new());
        let runner = Runner::new(config, store, blobs.clone())?;
        Ok(Session { runner, blobs })
    }
}

impl Session {
    /// Blocks on the task and returns its final record.
    fn finish(&self, sub: Submitted) -> Result<TaskSnapshot> {
        let run = sub
            .handle
            .wait()
            .ok_or_else(|| io::Error::other("worker exited without reporting"))?;
        info!(
            task = %run.id,
            state = ?run.state,
            layers = run.layers_completed,
            total = run.total_layers,
            "task finished"
        );
        self.runner.status(&sub.id)
    }

    /// Copies a stored result to `out_dir` and drops it from the blob store.
    fn take_result(&self, id: &TaskId, r: &TaskResult, out_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(out_dir)?;
        let dest = out_dir.join(&r.filename);
        io::copy(&mut self.blobs.open(&r.blob)?, &mut File::create(&dest)?)?;
        self.runner.delete_result(id, &r.delete_token)?;
        Ok(dest)
    }
}

fn plan_request(args: PlanArgs) -> PlanRequest {
    let encryption = match args.encrypt {
        EncryptMode::Odd => EncryptionPolicy::OddLayers,
        EncryptMode::Manual => {
            EncryptionPolicy::Manual(args.layers.into_iter().collect::<BTreeSet<_>>())
        }
    };
    PlanRequest {
        iterations: args.iterations,
        formats: args.formats,
        encryption,
        master: args.master_password.map(|password| MasterPolicy {
            password,
            interval: args.master_interval,
        }),
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| OnionError::Validation(format!("not a file: {}", path.display())))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(io::Error::from)?;
    println!("{text}");
    Ok(())
}

fn exit_for(snap: &TaskSnapshot) -> ExitCode {
    match &snap.outcome {
        Some(TaskOutcome::Succeeded(_)) => ExitCode::SUCCESS,
        Some(TaskOutcome::Failed { cause }) => {
            eprintln!("task {} failed: {cause}", snap.id);
            ExitCode::FAILURE
        }
        Some(TaskOutcome::Cancelled) => {
            eprintln!("task {} was cancelled", snap.id);
            ExitCode::FAILURE
        }
        None => {
            eprintln!("task {} never reached a final state", snap.id);
            ExitCode::FAILURE
        }
    }
}

pub fn handle_compress(
    settings: &Settings,
    source: PathBuf,
    out_dir: PathBuf,
    plan: PlanArgs,
) -> Result<ExitCode> {
    let session = settings.session()?;
    let sub = session.runner.submit_compress(onion_core::CompressRequest {
        filename: file_name(&source)?,
        source,
        plan: plan_request(plan),
    })?;
    let id = sub.id.clone();
    let snap = session.finish(sub)?;
    print_json(&snap)?;

    if let Some(TaskOutcome::Succeeded(r)) = &snap.outcome {
        let artifact = session.take_result(&id, r, &out_dir)?;
        if let Some(text) = &r.manifest {
            let manifest_path = out_dir.join(format!("{}.manifest.txt", r.filename));
            fs::write(&manifest_path, text)?;
            eprintln!("manifest:  {}", manifest_path.display());
        }
        eprintln!("archive:   {}", artifact.display());
    }
    Ok(exit_for(&snap))
}

pub fn handle_decompress(
    settings: &Settings,
    archive: PathBuf,
    manifest: PathBuf,
    master_password: Option<String>,
    name: Option<String>,
    out_dir: PathBuf,
) -> Result<ExitCode> {
    let manifest_text = fs::read_to_string(&manifest)?;
    let filename = match name {
        Some(n) => n,
        None => file_name(&archive)?,
    };
    let session = settings.session()?;
    let sub = session
        .runner
        .submit_decompress(onion_core::DecompressRequest {
            source: archive,
            filename,
            manifest_text,
            master_password,
        })?;
    let id = sub.id.clone();
    let snap = session.finish(sub)?;
    print_json(&snap)?;

    if let Some(TaskOutcome::Succeeded(r)) = &snap.outcome {
        let out = session.take_result(&id, r, &out_dir)?;
        eprintln!("recovered: {}", out.display());
    }
    Ok(exit_for(&snap))
}

#[derive(Serialize)]
struct RoundtripReport<'a> {
    compress_task: &'a str,
    decompress_task: &'a str,
    layers: usize,
    artifact: &'a str,
    recovered: &'a str,
    identical: bool,
}

pub fn handle_roundtrip(settings: &Settings, source: PathBuf, plan: PlanArgs) -> Result<ExitCode> {
    let master = plan.master_password.clone();
    let session = settings.session()?;
    let sub = session.runner.submit_compress(onion_core::CompressRequest {
        filename: file_name(&source)?,
        source: source.clone(),
        plan: plan_request(plan),
    })?;
    let cid = sub.id.clone();
    let packed = session.finish(sub)?;
    let Some(TaskOutcome::Succeeded(artifact)) = &packed.outcome else {
        print_json(&packed)?;
        return Ok(exit_for(&packed));
    };

    let sub = session.runner.submit_shared_decompress(&cid, master)?;
    let did = sub.id.clone();
    let peeled = session.finish(sub)?;
    let Some(TaskOutcome::Succeeded(recovered)) = &peeled.outcome else {
        print_json(&peeled)?;
        return Ok(exit_for(&peeled));
    };

    let mut got = Vec::new();
    session.blobs.open(&recovered.blob)?.read_to_end(&mut got)?;
    let identical = got == fs::read(&source)?;
    if !identical {
        warn!(task = %did, "recovered bytes differ from the input");
    }
    print_json(&RoundtripReport {
        compress_task: cid.as_str(),
        decompress_task: did.as_str(),
        layers: artifact.manifest.as_deref().map(|m| Manifest::parse(m).len()).unwrap_or(0),
        artifact: &artifact.filename,
        recovered: &recovered.filename,
        identical,
    })?;

    session.runner.delete_result(&cid, &artifact.delete_token)?;
    session.runner.delete_result(&did, &recovered.delete_token)?;
    Ok(if identical {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub fn handle_storage(settings: &Settings) -> Result<ExitCode> {
    let report = settings.session()?.runner.storage_stats()?;
    if !report.can_upload {
        warn!(used = report.used_bytes, quota = report.quota_bytes, "storage quota reached");
    }
    print_json(&report)?;
    Ok(ExitCode::SUCCESS)
}

pub fn handle_manifest(file: PathBuf) -> Result<ExitCode> {
    let manifest = Manifest::parse(&fs::read_to_string(&file)?);
    if manifest.is_empty() {
        eprintln!("no layer entries found in {}", file.display());
        return Ok(ExitCode::FAILURE);
    }
    print_json(&manifest.entries)?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use onion_core::ArchiveFormat;

    fn args(encrypt: EncryptMode, layers: Vec<u32>, master: Option<&str>) -> PlanArgs {
        PlanArgs {
            iterations: 4,
            formats: vec![ArchiveFormat::Zip],
            encrypt,
            layers,
            master_password: master.map(str::to_string),
            master_interval: 2,
        }
    }

    #[test]
    fn manual_layers_become_a_set() {
        let req = plan_request(args(EncryptMode::Manual, vec![4, 1, 4], None));
        assert_eq!(req.encryption, EncryptionPolicy::Manual([1, 4].into_iter().collect()));
        assert!(req.master.is_none());
    }

    #[test]
    fn master_password_enables_master_policy() {
        let req = plan_request(args(EncryptMode::Odd, vec![], Some("s3cret")));
        let m = req.master.unwrap();
        assert_eq!(m.password, "s3cret");
        assert_eq!(m.interval, 2);
    }

    #[test]
    fn flags_override_environment() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings {
            work_dir: Some(dir.path().to_path_buf()),
            workers: Some(1),
        };
        let cfg = s.config().unwrap();
        assert_eq!(cfg.work_dir, dir.path());
        assert_eq!(cfg.max_concurrent_tasks, 1);

        let zero = Settings {
            work_dir: None,
            workers: Some(0),
        };
        assert!(zero.config().is_err());
    }

    #[test]
    fn roundtrip_through_the_cli_handlers() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        fs::write(&input, b"layered notes").unwrap();
        let s = Settings {
            work_dir: Some(dir.path().join("work")),
            workers: Some(2),
        };
        let code = handle_roundtrip(&s, input, args(EncryptMode::Odd, vec![], Some("m"))).unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
    }
}
