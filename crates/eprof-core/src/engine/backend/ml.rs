//! Machine-learned potentials served by a persistent predictor process.
//!
//! The predictor is started once, as `<command> [args] --model M --device D`, and
//! speaks newline-delimited JSON over its standard streams:
//!
//! 1. After loading the model it prints a handshake,
//!    `{"ready": true, "model": "uma-s-1", "device": "cuda", "tasks": ["omat", "omc"]}`,
//!    or `{"ready": false, "error": "..."}` when the model cannot be loaded. `model`,
//!    `device` and `tasks` are optional; when present they must match the request.
//! 2. For every request `{"task": "omat", "structure": "<extended XYZ>"}` read from
//!    stdin it prints exactly one reply, `{"energy": -123.4}` (eV) or
//!    `{"error": "..."}`.
//!
//! Stdout lines that do not start with `{` are treated as log output and skipped.

use super::process::{Session, find_executable};
use super::{BackendUnavailable, EnergyBackend, EvaluationError, EvaluationOptions};
use crate::core::io::traits::StructureFile;
use crate::core::io::xyz::ExtXyzFile;
use crate::core::models::element::Element;
use crate::core::models::structure::Structure;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_MODEL: &str = "uma-s-1";
pub const DEFAULT_DEVICE: &str = "cuda";
pub const DEFAULT_TASKS: [&str; 2] = ["omat", "omc"];
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq)]
pub struct MlConfig {
    /// Predictor executable, a path or a name looked up on `PATH`.
    pub command: String,
    /// Extra arguments placed before the model/device flags.
    pub args: Vec<String>,
    pub model: String,
    pub device: String,
    pub tasks: Vec<String>,
    /// Longest wait for the handshake, i.e. for the model to load.
    pub startup_timeout: Option<Duration>,
}

impl MlConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            model: DEFAULT_MODEL.to_string(),
            device: DEFAULT_DEVICE.to_string(),
            tasks: DEFAULT_TASKS.iter().map(|t| t.to_string()).collect(),
            startup_timeout: Some(DEFAULT_STARTUP_TIMEOUT),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Handshake {
    ready: bool,
    error: Option<String>,
    model: Option<String>,
    device: Option<String>,
    tasks: Option<Vec<String>>,
}

impl Handshake {
    fn check(self, config: &MlConfig) -> Result<(), BackendUnavailable> {
        if !self.ready {
            return Err(BackendUnavailable::PredictorStartup(
                self.error
                    .unwrap_or_else(|| "predictor reported it is not ready".to_string()),
            ));
        }
        for (what, reported, expected) in [
            ("model", &self.model, &config.model),
            ("device", &self.device, &config.device),
        ] {
            if let Some(reported) = reported {
                if reported != expected {
                    return Err(BackendUnavailable::PredictorStartup(format!(
                        "predictor loaded {what} '{reported}', expected '{expected}'"
                    )));
                }
            }
        }
        if let Some(served) = &self.tasks {
            if let Some(task) = config.tasks.iter().find(|t| !served.contains(t)) {
                return Err(BackendUnavailable::UnsupportedTask {
                    task: task.clone(),
                    available: served.join(", "),
                });
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct Request<'a> {
    task: &'a str,
    structure: &'a str,
}

#[derive(Debug, Deserialize)]
struct Reply {
    energy: Option<f64>,
    error: Option<String>,
}

impl Reply {
    fn into_energy(self) -> Result<f64, EvaluationError> {
        match (self.energy, self.error) {
            (_, Some(error)) => Err(EvaluationError::Rejected(error)),
            (Some(energy), None) if energy.is_finite() => Ok(energy),
            (Some(energy), None) => Err(EvaluationError::NonFinite(energy)),
            (None, None) => Err(EvaluationError::MalformedOutput(
                "reply carries neither an energy nor an error".to_string(),
            )),
        }
    }
}

/// Reads the next JSON message, skipping log lines, within `timeout`.
fn read_message<T: DeserializeOwned>(
    session: &mut Session,
    timeout: Option<Duration>,
) -> Result<T, EvaluationError> {
    let started = Instant::now();
    loop {
        let wait = timeout.map(|limit| limit.saturating_sub(started.elapsed()));
        let Some(line) = session.recv_line(wait)? else {
            return Err(EvaluationError::Timeout(timeout.unwrap_or_default()));
        };
        let line = line.trim();
        if !line.starts_with('{') {
            if !line.is_empty() {
                debug!("predictor: {line}");
            }
            continue;
        }
        return serde_json::from_str(line)
            .map_err(|e| EvaluationError::MalformedOutput(format!("{e}: {line}")));
    }
}

/// A running predictor that has completed its handshake.
#[derive(Debug)]
struct Predictor {
    session: Session,
}

impl Predictor {
    fn start(program: &Path, config: &MlConfig) -> Result<Self, BackendUnavailable> {
        let mut command = Command::new(program);
        command
            .args(&config.args)
            .args(["--model", config.model.as_str()])
            .args(["--device", config.device.as_str()]);

        let startup = |e: EvaluationError| BackendUnavailable::PredictorStartup(e.to_string());
        let mut session = Session::spawn(command).map_err(startup)?;
        let handshake: Handshake =
            read_message(&mut session, config.startup_timeout).map_err(startup)?;
        handshake.check(config)?;
        Ok(Self { session })
    }

    fn predict(&mut self, request: &str, timeout: Option<Duration>) -> Result<f64, EvaluationError> {
        self.session.send_line(request)?;
        read_message::<Reply>(&mut self.session, timeout)?.into_energy()
    }
}

/// Errors after which the predictor's state is unknown, so it must not be reused.
fn leaves_predictor_broken(err: &EvaluationError) -> bool {
    matches!(
        err,
        EvaluationError::Timeout(_)
            | EvaluationError::ProcessFailed { .. }
            | EvaluationError::Io(_)
            | EvaluationError::Spawn { .. }
    )
}

/// A machine-learned potential served by one long-lived predictor process.
///
/// The model is loaded once, when the backend is constructed, and every task the
/// backend declares is answered by that same process. Requests from concurrent sweeps
/// are serialized. A predictor that times out or dies is killed and started again
/// for the next evaluation.
#[derive(Debug)]
pub struct MlBackend {
    config: MlConfig,
    program: PathBuf,
    predictor: Mutex<Option<Predictor>>,
}

impl MlBackend {
    /// Starts the predictor and waits for its handshake.
    ///
    /// # Errors
    ///
    /// Returns [`BackendUnavailable`] if the predictor cannot be found, no task is
    /// declared, or the predictor fails to load the requested model on the requested
    /// device.
    pub fn new(config: MlConfig) -> Result<Self, BackendUnavailable> {
        let program = find_executable(&config.command)
            .ok_or_else(|| BackendUnavailable::ExecutableNotFound(config.command.clone()))?;
        if config.tasks.is_empty() {
            return Err(BackendUnavailable::InvalidConfiguration(
                "the ML backend declares no tasks".to_string(),
            ));
        }

        let predictor = Predictor::start(&program, &config)?;
        info!(
            model = %config.model,
            device = %config.device,
            tasks = ?config.tasks,
            "ML predictor loaded ({}).",
            program.display()
        );
        Ok(Self {
            config,
            program,
            predictor: Mutex::new(Some(predictor)),
        })
    }

    pub fn config(&self) -> &MlConfig {
        &self.config
    }
}

impl EnergyBackend for MlBackend {
    fn name(&self) -> &str {
        "ml"
    }

    fn tasks(&self) -> Vec<String> {
        self.config.tasks.clone()
    }

    fn evaluate(
        &self,
        structure: &Structure,
        _elements: &[Element],
        task: &str,
        options: &EvaluationOptions,
    ) -> Result<f64, EvaluationError> {
        let mut xyz = Vec::new();
        ExtXyzFile::write_to(structure, &mut xyz)
            .map_err(|e| EvaluationError::Serialize(e.to_string()))?;
        let request = serde_json::to_string(&Request {
            task,
            structure: &String::from_utf8_lossy(&xyz),
        })
        .map_err(|e| EvaluationError::Serialize(e.to_string()))?;

        let mut slot = self
            .predictor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut predictor = match slot.take() {
            Some(predictor) => predictor,
            None => {
                info!(model = %self.config.model, "Restarting ML predictor.");
                Predictor::start(&self.program, &self.config)?
            }
        };

        debug!(task, atoms = structure.len(), "Requesting ML prediction.");
        let result = predictor.predict(&request, options.timeout);
        match &result {
            Err(e) if leaves_predictor_broken(e) => {
                warn!(task, "Discarding ML predictor: {e}");
                drop(predictor);
            }
            _ => *slot = Some(predictor),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(json: &str) -> Result<f64, EvaluationError> {
        serde_json::from_str::<Reply>(json).unwrap().into_energy()
    }

    #[test]
    fn reply_carries_energy_or_error() {
        assert_eq!(reply(r#"{"energy": -12.5, "forces": []}"#).unwrap(), -12.5);
        assert!(matches!(
            reply(r#"{"error": "bad structure"}"#),
            Err(EvaluationError::Rejected(msg)) if msg == "bad structure"
        ));
        assert!(matches!(
            reply(r#"{"e": 1.0}"#),
            Err(EvaluationError::MalformedOutput(_))
        ));
    }

    #[test]
    fn handshake_must_match_the_request() {
        let config = MlConfig::new("predict");
        let handshake = |json: &str| serde_json::from_str::<Handshake>(json).unwrap();

        assert!(
            handshake(r#"{"ready": true}"#).check(&config).is_ok(),
            "optional fields may be omitted"
        );
        assert!(matches!(
            handshake(r#"{"ready": true, "model": "uma-m-1"}"#).check(&config),
            Err(BackendUnavailable::PredictorStartup(_))
        ));
        assert!(matches!(
            handshake(r#"{"ready": true, "tasks": ["omat"]}"#).check(&config),
            Err(BackendUnavailable::UnsupportedTask { task, .. }) if task == "omc"
        ));
        assert!(matches!(
            handshake(r#"{"ready": false, "error": "no GPU"}"#).check(&config),
            Err(BackendUnavailable::PredictorStartup(msg)) if msg == "no GPU"
        ));
    }

    #[test]
    fn missing_predictor_is_unavailable() {
        let err = MlBackend::new(MlConfig::new("/no/such/predictor")).unwrap_err();
        assert!(matches!(err, BackendUnavailable::ExecutableNotFound(_)));
    }

    #[cfg(unix)]
    mod process_backed {
        use super::*;
        use crate::core::models::atom::Atom;
        use crate::core::models::structure::Cell;
        use nalgebra::Point3;
        use std::fs;
        use std::thread;
        use tempfile::{TempDir, tempdir};

        /// Logs every start to `starts`, then answers `omat` with 1.5 (when a lattice
        /// was sent) and `omc` with -2.5 after `@OMC_DELAY@` seconds.
        const PREDICTOR: &str = r#"
echo start >> '@STARTS@'
echo "loading $2 on $4"
echo "{\"ready\": true, \"model\": \"$2\", \"device\": \"$4\", \"tasks\": [\"omat\", \"omc\"]}"
while IFS= read -r line; do
  case "$line" in
    *'"task":"omc"'*) sleep @OMC_DELAY@; echo '{"energy": -2.5}' ;;
    *'"task":"omat"'*Lattice=*) echo '{"energy": 1.5}' ;;
    *) echo '{"error": "unsupported request"}' ;;
  esac
done
"#;

        // Run through `sh` so the freshly written file never has to be exec'd directly.
        fn config(dir: &TempDir, body: &str) -> MlConfig {
            let path = dir.path().join("predict.sh");
            let starts = dir.path().join("starts");
            fs::write(&path, body.replace("@STARTS@", &starts.to_string_lossy())).unwrap();
            let mut config = MlConfig::new("sh");
            config.args = vec![path.to_string_lossy().to_string()];
            config.startup_timeout = Some(Duration::from_secs(10));
            config
        }

        fn predictor(dir: &TempDir, omc_delay: u32) -> MlBackend {
            let body = PREDICTOR.replace("@OMC_DELAY@", &omc_delay.to_string());
            MlBackend::new(config(dir, &body)).unwrap()
        }

        fn starts(dir: &TempDir) -> usize {
            fs::read_to_string(dir.path().join("starts"))
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }

        fn structure() -> Structure {
            Structure::periodic(
                vec![
                    Atom::new(Element::C, Point3::new(0.0, 0.0, 10.0)),
                    Atom::new(Element::H, Point3::new(0.0, 0.0, 12.0)),
                ],
                Cell::orthorhombic(5.0, 5.0, 20.0).unwrap(),
                [true; 3],
            )
        }

        #[test]
        fn one_predictor_serves_every_evaluation() {
            let dir = tempdir().unwrap();
            let backend = predictor(&dir, 0);
            let options = EvaluationOptions::default();
            let s = structure();

            assert_eq!(backend.evaluate(&s, &[], "omat", &options).unwrap(), 1.5);
            assert_eq!(backend.evaluate(&s, &[], "omc", &options).unwrap(), -2.5);
            assert_eq!(backend.evaluate(&s, &[], "omat", &options).unwrap(), 1.5);
            assert_eq!(starts(&dir), 1);
        }

        #[test]
        fn concurrent_evaluations_share_the_predictor() {
            let dir = tempdir().unwrap();
            let backend = predictor(&dir, 0);
            let options = EvaluationOptions::default();
            let s = structure();

            thread::scope(|scope| {
                let handles: Vec<_> = (0..4)
                    .map(|_| scope.spawn(|| backend.evaluate(&s, &[], "omat", &options)))
                    .collect();
                for handle in handles {
                    assert_eq!(handle.join().unwrap().unwrap(), 1.5);
                }
            });
            assert_eq!(starts(&dir), 1);
        }

        #[test]
        fn error_reply_fails_only_that_point() {
            let dir = tempdir().unwrap();
            let backend = predictor(&dir, 0);
            let options = EvaluationOptions::default();

            let err = backend
                .evaluate(&structure(), &[], "odac", &options)
                .unwrap_err();
            assert!(matches!(err, EvaluationError::Rejected(_)));
            assert_eq!(
                backend.evaluate(&structure(), &[], "omat", &options).unwrap(),
                1.5
            );
            assert_eq!(starts(&dir), 1);
        }

        #[test]
        fn timed_out_predictor_is_restarted() {
            let dir = tempdir().unwrap();
            let backend = predictor(&dir, 5);
            let options = EvaluationOptions {
                timeout: Some(Duration::from_millis(200)),
            };

            let err = backend
                .evaluate(&structure(), &[], "omc", &options)
                .unwrap_err();
            assert!(matches!(err, EvaluationError::Timeout(_)));
            assert_eq!(
                backend.evaluate(&structure(), &[], "omat", &options).unwrap(),
                1.5
            );
            assert_eq!(starts(&dir), 2);
        }

        #[test]
        fn missing_model_fails_construction() {
            let dir = tempdir().unwrap();
            let body = "echo start >> '@STARTS@'; echo 'model weights not found' >&2; exit 1";
            let err = MlBackend::new(config(&dir, body)).unwrap_err();
            match err {
                BackendUnavailable::PredictorStartup(msg) => {
                    assert!(msg.contains("model weights not found"), "{msg}")
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn refused_device_fails_construction() {
            let dir = tempdir().unwrap();
            let body = r#"echo '{"ready": false, "error": "device cuda is not available"}'; sleep 5"#;
            let err = MlBackend::new(config(&dir, body)).unwrap_err();
            assert!(matches!(
                err,
                BackendUnavailable::PredictorStartup(msg) if msg.contains("cuda")
            ));
        }

        #[test]
        fn silent_predictor_times_out_at_startup() {
            let dir = tempdir().unwrap();
            let mut config = config(&dir, "sleep 5");
            config.startup_timeout = Some(Duration::from_millis(200));
            let err = MlBackend::new(config).unwrap_err();
            assert!(matches!(err, BackendUnavailable::PredictorStartup(_)));
        }

        #[test]
        fn undeclared_task_fails_preparation() {
            let dir = tempdir().unwrap();
            let backend = predictor(&dir, 0);
            assert!(backend.prepare(&[Element::H], "omat").is_ok());
            assert!(matches!(
                backend.prepare(&[Element::H], "odac"),
                Err(BackendUnavailable::UnsupportedTask { .. })
            ));
        }
    }
}
