use super::process::{self, find_executable};
use super::{BackendUnavailable, EnergyBackend, EvaluationError, EvaluationOptions};
use crate::core::models::element::Element;
use crate::core::models::structure::Structure;
use phf::{Map, phf_map};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// CODATA 2018 Rydberg energy in eV.
pub const RY_TO_EV: f64 = 13.605_693_122_994;
pub const DEFAULT_FUNCTIONAL: &str = "pbe";

const INPUT_FILE: &str = "pw.in";
const OUTPUT_FILE: &str = "pw.out";
const NOT_CONVERGED_MARKER: &str = "convergence NOT achieved";

static PBE_PSEUDOPOTENTIALS: Map<&'static str, &'static str> = phf_map! {
    "H" => "H.pbe-kjpaw_psl.1.0.0.UPF",
    "He" => "He.pbe-n-kjpaw_psl.1.0.0.UPF",
    "Li" => "Li.pbe-s-kjpaw_psl.1.0.0.UPF",
    "C" => "C.pbe-n-kjpaw_psl.1.0.0.UPF",
    "N" => "N.pbe-n-kjpaw_psl.1.0.0.UPF",
    "O" => "O.pbe-n-kjpaw_psl.1.0.0.UPF",
    "F" => "F.pbe-n-kjpaw_psl.1.0.0.UPF",
    "Na" => "Na.pbe-spn-kjpaw_psl.1.0.0.UPF",
    "Mg" => "Mg.pbe-spn-kjpaw_psl.1.0.0.UPF",
    "Al" => "Al.pbe-n-kjpaw_psl.1.0.0.UPF",
    "Si" => "Si.pbe-n-kjpaw_psl.1.0.0.UPF",
    "P" => "P.pbe-n-kjpaw_psl.1.0.0.UPF",
    "S" => "S.pbe-n-kjpaw_psl.1.0.0.UPF",
    "Cl" => "Cl.pbe-n-kjpaw_psl.1.0.0.UPF",
    "K" => "K.pbe-spn-kjpaw_psl.1.0.0.UPF",
    "Ca" => "Ca.pbe-spn-kjpaw_psl.1.0.0.UPF",
    "Ti" => "Ti.pbe-spn-kjpaw_psl.1.0.0.UPF",
    "V" => "V.pbe-spn-kjpaw_psl.1.0.0.UPF",
    "Cr" => "Cr.pbe-spn-kjpaw_psl.1.0.0.UPF",
    "Mn" => "Mn.pbe-spn-kjpaw_psl.1.0.0.UPF",
    "Fe" => "Fe.pbe-spn-kjpaw_psl.1.0.0.UPF",
    "Co" => "Co.pbe-spn-kjpaw_psl.1.0.0.UPF",
    "Ni" => "Ni.pbe-spn-kjpaw_psl.1.0.0.UPF",
    "Cu" => "Cu.pbe-spn-kjpaw_psl.1.0.0.UPF",
    "Zn" => "Zn.pbe-spn-kjpaw_psl.1.0.0.UPF",
    "Ga" => "Ga.pbe-dn-kjpaw_psl.1.0.0.UPF",
    "Ge" => "Ge.pbe-dn-kjpaw_psl.1.0.0.UPF",
    "As" => "As.pbe-n-kjpaw_psl.1.0.0.UPF",
    "Se" => "Se.pbe-n-kjpaw_psl.1.0.0.UPF",
    "Br" => "Br.pbe-n-kjpaw_psl.1.0.0.UPF",
    "Mo" => "Mo.pbe-spn-kjpaw_psl.1.0.0.UPF",
    "Ag" => "Ag.pbe-n-kjpaw_psl.1.0.0.UPF",
    "Cd" => "Cd.pbe-dn-kjpaw_psl.1.0.0.UPF",
    "In" => "In.pbe-dn-kjpaw_psl.1.0.0.UPF",
    "Sn" => "Sn.pbe-dn-kjpaw_psl.1.0.0.UPF",
    "Sb" => "Sb.pbe-n-kjpaw_psl.1.0.0.UPF",
    "Te" => "Te.pbe-n-kjpaw_psl.1.0.0.UPF",
    "I" => "I.pbe-n-kjpaw_psl.1.0.0.UPF",
    "Au" => "Au.pbe-n-kjpaw_psl.1.0.0.UPF",
    "Hg" => "Hg.pbe-dn-kjpaw_psl.1.0.0.UPF",
    "Pb" => "Pb.pbe-dn-kjpaw_psl.1.0.0.UPF",
    "Bi" => "Bi.pbe-dn-kjpaw_psl.1.0.0.UPF",
};

fn default_pseudopotentials(functional: &str) -> Option<&'static Map<&'static str, &'static str>> {
    match functional.to_ascii_lowercase().as_str() {
        "pbe" => Some(&PBE_PSEUDOPOTENTIALS),
        _ => None,
    }
}

/// Functionals with a built-in pseudopotential table.
pub fn available_functionals() -> &'static [&'static str] {
    &[DEFAULT_FUNCTIONAL]
}

/// Elements covered by the built-in table of `functional`, sorted.
pub fn available_elements(functional: &str) -> Vec<&'static str> {
    let mut elements: Vec<&'static str> = default_pseudopotentials(functional)
        .map(|table| table.keys().copied().collect())
        .unwrap_or_default();
    elements.sort_unstable();
    elements
}

/// Plane-wave SCF settings written into every `pw.x` input.
#[derive(Debug, Clone, PartialEq)]
pub struct DftParameters {
    pub ecutwfc: f64,
    pub ecutrho: f64,
    pub occupations: String,
    pub smearing: String,
    pub degauss: f64,
    pub vdw_corr: Option<String>,
    pub conv_thr: f64,
    pub electron_maxstep: Option<u32>,
    pub mixing_beta: Option<f64>,
    pub kpts: [u32; 3],
}

impl Default for DftParameters {
    fn default() -> Self {
        Self {
            ecutwfc: 80.0,
            ecutrho: 640.0,
            occupations: "smearing".to_string(),
            smearing: "mp".to_string(),
            degauss: 0.01,
            vdw_corr: Some("grimme-d3".to_string()),
            conv_thr: 1e-8,
            electron_maxstep: None,
            mixing_beta: None,
            kpts: [6, 6, 1],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DftConfig {
    pub pseudo_dir: PathBuf,
    pub num_cores: usize,
    /// MPI launcher placed in front of the executable as `<launcher> -n <cores>`.
    /// `None` runs the executable directly.
    pub launcher: Option<String>,
    pub executable: String,
    /// Element symbol to pseudopotential file name; consulted before the built-in table.
    pub custom_pseudopotentials: BTreeMap<String, String>,
    pub parameters: DftParameters,
    /// Each evaluation runs in its own uniquely named `pw_<n>_*` subdirectory of this
    /// directory, so several backends or runs may share it.
    pub work_dir: PathBuf,
    /// Keep `pw.in` / `pw.out` after a successful evaluation.
    pub keep_outputs: bool,
}

impl DftConfig {
    pub fn new(pseudo_dir: impl Into<PathBuf>) -> Self {
        Self {
            pseudo_dir: pseudo_dir.into(),
            num_cores: std::thread::available_parallelism().map_or(1, |n| n.get()),
            launcher: Some("mpiexec".to_string()),
            executable: "pw.x".to_string(),
            custom_pseudopotentials: BTreeMap::new(),
            parameters: DftParameters::default(),
            work_dir: std::env::temp_dir().join("eprof-dft"),
            keep_outputs: true,
        }
    }
}

/// Quantum ESPRESSO `pw.x` single-point SCF calculations.
///
/// The backend is bound to one pseudopotential directory and core count. Missing
/// pseudopotentials are reported by [`EnergyBackend::prepare`] so that a sweep never
/// starts with chemistry the engine cannot describe; an SCF run that does not converge
/// only fails its own point.
#[derive(Debug)]
pub struct QeBackend {
    config: DftConfig,
    launcher: Option<PathBuf>,
    executable: PathBuf,
    runs: AtomicUsize,
}

impl QeBackend {
    pub fn new(config: DftConfig) -> Result<Self, BackendUnavailable> {
        if !config.pseudo_dir.is_dir() {
            return Err(BackendUnavailable::PseudoDirMissing(config.pseudo_dir.clone()));
        }
        if config.num_cores == 0 {
            return Err(BackendUnavailable::InvalidConfiguration(
                "the DFT backend needs at least one core".to_string(),
            ));
        }
        let resolve = |program: &str| {
            find_executable(program)
                .ok_or_else(|| BackendUnavailable::ExecutableNotFound(program.to_string()))
        };
        let launcher = config.launcher.as_deref().map(resolve).transpose()?;
        let executable = resolve(&config.executable)?;
        info!(
            cores = config.num_cores,
            pseudo_dir = %config.pseudo_dir.display(),
            executable = %executable.display(),
            "DFT profile initialized."
        );
        Ok(Self {
            config,
            launcher,
            executable,
            runs: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &DftConfig {
        &self.config
    }

    /// Maps every element to its pseudopotential file: the custom map first, then the
    /// built-in table of `functional`.
    pub fn resolve_pseudopotentials(
        &self,
        elements: &[Element],
        functional: &str,
    ) -> Result<BTreeMap<Element, String>, BackendUnavailable> {
        let table = default_pseudopotentials(functional);
        elements
            .iter()
            .map(|&element| {
                self.config
                    .custom_pseudopotentials
                    .get(element.symbol())
                    .cloned()
                    .or_else(|| {
                        table
                            .and_then(|t| t.get(element.symbol()))
                            .map(|f| f.to_string())
                    })
                    .map(|file| (element, file))
                    .ok_or_else(|| BackendUnavailable::MissingPseudopotential {
                        element,
                        functional: functional.to_string(),
                    })
            })
            .collect()
    }

    fn command(&self, run_dir: &Path) -> Command {
        let mut command = match &self.launcher {
            Some(launcher) => {
                let mut command = Command::new(launcher);
                command
                    .arg("-n")
                    .arg(self.config.num_cores.to_string())
                    .arg(&self.executable);
                command
            }
            None => Command::new(&self.executable),
        };
        command.args(["-in", INPUT_FILE]).current_dir(run_dir);
        command
    }

    /// Creates a fresh run directory that no other backend or earlier run can share.
    fn run_dir(&self) -> io::Result<(usize, PathBuf)> {
        fs::create_dir_all(&self.config.work_dir)?;
        let run = self.runs.fetch_add(1, Ordering::Relaxed);
        let dir = tempfile::Builder::new()
            .prefix(&format!("pw_{run:04}_"))
            .tempdir_in(&self.config.work_dir)?;
        Ok((run, dir.keep()))
    }
}

impl EnergyBackend for QeBackend {
    fn name(&self) -> &str {
        "dft"
    }

    fn tasks(&self) -> Vec<String> {
        available_functionals()
            .iter()
            .map(|f| f.to_string())
            .collect()
    }

    /// Any functional is usable when every element has a custom pseudopotential; the
    /// check for that happens in [`EnergyBackend::prepare`].
    fn supports(&self, functional: &str) -> bool {
        default_pseudopotentials(functional).is_some()
            || !self.config.custom_pseudopotentials.is_empty()
    }

    fn prepare(&self, elements: &[Element], functional: &str) -> Result<(), BackendUnavailable> {
        if !self.supports(functional) {
            return Err(BackendUnavailable::UnsupportedTask {
                task: functional.to_string(),
                available: self.tasks().join(", "),
            });
        }
        for (element, file) in self.resolve_pseudopotentials(elements, functional)? {
            let path = self.config.pseudo_dir.join(&file);
            if !path.is_file() {
                return Err(BackendUnavailable::PseudopotentialFileMissing(path));
            }
            debug!(%element, file, "Pseudopotential resolved.");
        }
        Ok(())
    }

    fn evaluate(
        &self,
        structure: &Structure,
        _elements: &[Element],
        functional: &str,
        options: &EvaluationOptions,
    ) -> Result<f64, EvaluationError> {
        let pseudopotentials = self.resolve_pseudopotentials(&structure.elements(), functional)?;

        let (run, run_dir) = self.run_dir()?;

        let mut input = Vec::new();
        write_pw_input(
            &mut input,
            structure,
            &pseudopotentials,
            &self.config.pseudo_dir,
            &self.config.parameters,
        )
        .map_err(|e| match e.kind() {
            io::ErrorKind::InvalidInput => EvaluationError::MissingCell,
            _ => EvaluationError::Io(e),
        })?;
        fs::write(run_dir.join(INPUT_FILE), &input)?;

        debug!(run, dir = %run_dir.display(), "Launching pw.x.");
        let output = process::run(self.command(&run_dir), None, options.timeout)?;
        fs::write(run_dir.join(OUTPUT_FILE), &output.stdout)?;

        let text = String::from_utf8_lossy(&output.stdout);
        if text.contains(NOT_CONVERGED_MARKER) {
            return Err(EvaluationError::NotConverged);
        }
        process::check_status(&output)?;
        let energy = parse_total_energy(&text)?;

        if !self.config.keep_outputs {
            if let Err(e) = fs::remove_dir_all(&run_dir) {
                warn!(dir = %run_dir.display(), "Could not remove DFT run directory: {e}");
            }
        }
        Ok(energy)
    }
}

/// Writes a `pw.x` SCF input with the cell and positions in Angstrom.
///
/// Fails with [`io::ErrorKind::InvalidInput`] when the structure has no cell.
pub fn write_pw_input(
    w: &mut impl Write,
    structure: &Structure,
    pseudopotentials: &BTreeMap<Element, String>,
    pseudo_dir: &Path,
    parameters: &DftParameters,
) -> io::Result<()> {
    let cell = structure.cell().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "structure has no periodic cell")
    })?;
    let species = structure.elements();

    writeln!(w, "&CONTROL")?;
    writeln!(w, "  calculation = 'scf'")?;
    writeln!(w, "  prefix = 'eprof'")?;
    writeln!(w, "  outdir = './tmp'")?;
    writeln!(w, "  pseudo_dir = '{}'", pseudo_dir.display())?;
    writeln!(w, "/")?;

    writeln!(w, "&SYSTEM")?;
    writeln!(w, "  ibrav = 0")?;
    writeln!(w, "  nat = {}", structure.len())?;
    writeln!(w, "  ntyp = {}", species.len())?;
    writeln!(w, "  ecutwfc = {}", parameters.ecutwfc)?;
    writeln!(w, "  ecutrho = {}", parameters.ecutrho)?;
    writeln!(w, "  occupations = '{}'", parameters.occupations)?;
    writeln!(w, "  smearing = '{}'", parameters.smearing)?;
    writeln!(w, "  degauss = {}", parameters.degauss)?;
    if let Some(vdw) = &parameters.vdw_corr {
        writeln!(w, "  vdw_corr = '{vdw}'")?;
    }
    writeln!(w, "/")?;

    writeln!(w, "&ELECTRONS")?;
    writeln!(w, "  conv_thr = {:e}", parameters.conv_thr)?;
    if let Some(steps) = parameters.electron_maxstep {
        writeln!(w, "  electron_maxstep = {steps}")?;
    }
    if let Some(beta) = parameters.mixing_beta {
        writeln!(w, "  mixing_beta = {beta}")?;
    }
    writeln!(w, "/")?;

    writeln!(w, "ATOMIC_SPECIES")?;
    for element in &species {
        let file = pseudopotentials.get(element).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no pseudopotential for {element}"),
            )
        })?;
        writeln!(w, "{element} {:.4} {file}", element.mass())?;
    }

    writeln!(w, "CELL_PARAMETERS angstrom")?;
    for row in cell.rows() {
        writeln!(w, "  {:.10} {:.10} {:.10}", row[0], row[1], row[2])?;
    }

    writeln!(w, "ATOMIC_POSITIONS angstrom")?;
    for atom in structure.atoms() {
        let p = &atom.position;
        writeln!(w, "{:<2} {:.10} {:.10} {:.10}", atom.element, p.x, p.y, p.z)?;
    }

    let [k1, k2, k3] = parameters.kpts;
    writeln!(w, "K_POINTS automatic")?;
    writeln!(w, "{k1} {k2} {k3} 0 0 0")?;
    Ok(())
}

/// Extracts the final converged total energy (`!    total energy = ... Ry`) in eV.
pub fn parse_total_energy(output: &str) -> Result<f64, EvaluationError> {
    let line = output
        .lines()
        .rev()
        .find(|l| l.trim_start().starts_with('!') && l.contains("total energy"))
        .ok_or_else(|| EvaluationError::MalformedOutput("no final total energy line".to_string()))?;
    let value = line
        .split_once('=')
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .ok_or_else(|| EvaluationError::MalformedOutput(line.trim().to_string()))?;
    let rydberg: f64 = value
        .parse()
        .map_err(|_| EvaluationError::MalformedOutput(line.trim().to_string()))?;
    if !rydberg.is_finite() {
        return Err(EvaluationError::NonFinite(rydberg));
    }
    Ok(rydberg * RY_TO_EV)
}
