//! Devices backed by a directory of XML files.
//!
//! Layout per device id:
//! - `<device>.xml` live configuration
//! - `<device>.candidate.xml` staged candidate
//! - `<device>.ha` HA status word (absent means standalone)
//! - `<device>.history` one line per commit: timestamp, revision, comment

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use intent_core::{apply_diff, parse_snapshot, render_snapshot, DiffRecord};
use tokio::io::AsyncWriteExt;

use super::{
    AdapterError, AdapterOp, CandidateHandle, CommitResult, ConfigPayload, DeviceAdapter, HaStatus,
    ValidationResult,
};

#[derive(Debug, Clone)]
pub struct FileDeviceAdapter {
    root: PathBuf,
}

impl FileDeviceAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn live_path(&self, device: &str) -> PathBuf {
        self.root.join(format!("{device}.xml"))
    }

    pub fn candidate_path(&self, device: &str) -> PathBuf {
        self.root.join(format!("{device}.candidate.xml"))
    }

    fn ha_path(&self, device: &str) -> PathBuf {
        self.root.join(format!("{device}.ha"))
    }

    fn history_path(&self, device: &str) -> PathBuf {
        self.root.join(format!("{device}.history"))
    }

    async fn read(&self, path: &Path, device: &str, op: AdapterOp) -> Result<Vec<u8>, AdapterError> {
        tokio::fs::read(path)
            .await
            .map_err(|err| io_error(device, op, path, err))
    }
}

fn io_error(device: &str, op: AdapterOp, path: &Path, err: std::io::Error) -> AdapterError {
    let message = format!("{}: {err}", path.display());
    match err.kind() {
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            AdapterError::transient(device, op, message)
        }
        _ => AdapterError::permanent(device, op, message),
    }
}

#[async_trait]
impl DeviceAdapter for FileDeviceAdapter {
    async fn fetch_live_config(&self, device: &str) -> Result<ConfigPayload, AdapterError> {
        let bytes = self.read(&self.live_path(device), device, AdapterOp::Fetch).await?;
        Ok(ConfigPayload(bytes))
    }

    async fn push_candidate(
        &self,
        device: &str,
        diff: &DiffRecord,
    ) -> Result<CandidateHandle, AdapterError> {
        let op = AdapterOp::Push;
        let raw = self.read(&self.live_path(device), device, op).await?;
        let live = parse_snapshot(&raw)
            .map_err(|err| AdapterError::permanent(device, op, format!("live config: {err}")))?;
        let staged =
            apply_diff(&live, diff).map_err(|err| AdapterError::permanent(device, op, err.to_string()))?;
        let rendered =
            render_snapshot(&staged).map_err(|err| AdapterError::permanent(device, op, err.to_string()))?;
        let path = self.candidate_path(device);
        tokio::fs::write(&path, rendered)
            .await
            .map_err(|err| io_error(device, op, &path, err))?;
        Ok(CandidateHandle {
            id: format!("{device}:{}", diff.id),
            device: device.to_string(),
            diff_id: diff.id.clone(),
        })
    }

    async fn validate_candidate(
        &self,
        device: &str,
        _candidate: &CandidateHandle,
    ) -> Result<ValidationResult, AdapterError> {
        let raw = self
            .read(&self.candidate_path(device), device, AdapterOp::Validate)
            .await?;
        Ok(match parse_snapshot(&raw) {
            Ok(_) => ValidationResult::accepted(),
            Err(err) => ValidationResult::rejected(err.to_string()),
        })
    }

    async fn commit(
        &self,
        device: &str,
        _candidate: &CandidateHandle,
        comment: &str,
    ) -> Result<CommitResult, AdapterError> {
        let op = AdapterOp::Commit;
        let candidate = self.candidate_path(device);
        let live = self.live_path(device);
        tokio::fs::rename(&candidate, &live)
            .await
            .map_err(|err| io_error(device, op, &candidate, err))?;

        let history = self.history_path(device);
        let previous = match tokio::fs::read_to_string(&history).await {
            Ok(text) => text.lines().count() as u64,
            Err(err) if err.kind() == ErrorKind::NotFound => 0,
            Err(err) => return Err(io_error(device, op, &history, err)),
        };
        let revision = previous + 1;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&history)
            .await
            .map_err(|err| io_error(device, op, &history, err))?;
        let line = format!("{}\t{revision}\t{}\n", Utc::now().to_rfc3339(), comment.replace('\n', " "));
        file.write_all(line.as_bytes())
            .await
            .map_err(|err| io_error(device, op, &history, err))?;
        Ok(CommitResult { revision })
    }

    async fn fetch_ha_status(&self, device: &str) -> Result<HaStatus, AdapterError> {
        let op = AdapterOp::HaStatus;
        let path = self.ha_path(device);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => HaStatus::parse(&text).ok_or_else(|| {
                AdapterError::permanent(device, op, format!("unrecognised HA status '{}'", text.trim()))
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(HaStatus::Standalone),
            Err(err) => Err(io_error(device, op, &path, err)),
        }
    }

    async fn discard_candidate(
        &self,
        device: &str,
        _candidate: &CandidateHandle,
    ) -> Result<(), AdapterError> {
        let path = self.candidate_path(device);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(device, AdapterOp::Discard, &path, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use intent_core::{diff_snapshots, parse_snapshot};
    use tempfile::tempdir;

    use super::FileDeviceAdapter;
    use crate::adapter::{DeviceAdapter, HaStatus};

    const V1: &str = r#"<intent environment="lab" group="core" version="v1">
  <address name="a"><member>10.0.0.1</member></address>
</intent>"#;
    const V2: &str = r#"<intent environment="lab" group="core" version="v2">
  <address name="a"><member>10.0.0.1</member></address>
  <address name="b"><member>10.0.0.2</member></address>
</intent>"#;

    #[tokio::test]
    async fn staged_commit_replaces_live_file_and_logs_history() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("fw1.xml"), V1).expect("write live");
        let adapter = FileDeviceAdapter::new(dir.path());

        let live = parse_snapshot(V1.as_bytes()).expect("v1");
        let target = parse_snapshot(V2.as_bytes()).expect("v2");
        let diff = diff_snapshots(&live, &target);

        let handle = adapter.push_candidate("fw1", &diff).await.expect("push");
        assert!(adapter.candidate_path("fw1").exists());
        assert!(adapter.validate_candidate("fw1", &handle).await.expect("validate").accepted);
        let result = adapter.commit("fw1", &handle, "ticket=CHG-7").await.expect("commit");
        assert_eq!(result.revision, 1);
        assert!(!adapter.candidate_path("fw1").exists());

        let payload = adapter.fetch_live_config("fw1").await.expect("fetch");
        assert_eq!(payload.parse().expect("parse").fingerprint(), target.fingerprint());
        let history = fs::read_to_string(dir.path().join("fw1.history")).expect("history");
        assert!(history.contains("ticket=CHG-7"));
    }

    #[tokio::test]
    async fn ha_status_defaults_to_standalone() {
        let dir = tempdir().expect("tempdir");
        let adapter = FileDeviceAdapter::new(dir.path());
        assert_eq!(adapter.fetch_ha_status("fw1").await.expect("ha"), HaStatus::Standalone);
        fs::write(dir.path().join("fw1.ha"), "passive\n").expect("write ha");
        assert_eq!(adapter.fetch_ha_status("fw1").await.expect("ha"), HaStatus::Passive);
    }

    #[tokio::test]
    async fn missing_live_file_is_a_permanent_error() {
        let dir = tempdir().expect("tempdir");
        let adapter = FileDeviceAdapter::new(dir.path());
        let err = adapter.fetch_live_config("ghost").await.expect_err("missing");
        assert!(!err.is_transient());
    }
}
