use crate::cli::InitConfigArgs;
use crate::error::{CliError, Result};
use std::fs;
use tracing::info;

pub const EXAMPLE_CONFIG: &str = r#"# eprof configuration
#
# Command-line flags override `-S key=value` settings, which override this file.
# Every key is optional; omitted keys fall back to the built-in defaults shown here.

[surface]
# Crystal slabs: see `eprof surfaces` (e.g. Au, Pt, Cu for fcc, Fe, W for bcc, Ti, Ru for hcp).
# 2D layers: MoS2, WS2, MoSe2, WSe2, graphene, h-BN.
material = "Au"
miller = [1, 1, 1]
# [nx, ny, layers] for slabs, [nx, ny] for 2D layers.
size = [3, 3, 4]
vacuum = 14.0
# file = "slab.xyz"   # extended XYZ with a Lattice header, replaces `material`

[adsorbant]
species = "H2O"
orientation = "flat"
# custom-species = "species.toml"

[sampling]
z-start = 2.0
z-end = 8.0
z-step = 0.2
parallel = false
# timeout-secs = 3600

[ml]
enabled = true
# Started once with `--model <model> --device <device>`; it answers a JSON handshake,
# then one {"energy": <eV>} line per {"task": ..., "structure": <extended XYZ>} request.
command = "eprof-predict"
model = "uma-s-1"
device = "cuda"
tasks = ["omat", "omc"]
# startup-timeout-secs = 600

[dft]
enabled = true
functional = "pbe"
# DFT runs on every `height-stride`-th height of the grid.
height-stride = 2
pseudo-dir = "./pseudo"
# num-cores = 8
launcher = "mpiexec"
executable = "pw.x"
ecutwfc = 80.0
ecutrho = 640.0
kpts = [6, 6, 1]
# pseudopotentials = { Au = "Au_ONCV_PBE-1.0.oncvpsp.upf" }

[output]
directory = "./results"
save-structures = true
"#;

pub fn run(args: InitConfigArgs) -> Result<()> {
    if args.path.exists() && !args.force {
        return Err(CliError::Argument(format!(
            "'{}' already exists. Use --force to overwrite it.",
            args.path.display()
        )));
    }
    if let Some(parent) = args.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&args.path, EXAMPLE_CONFIG)?;
    info!("Example configuration written to {:?}", args.path);
    println!("Example configuration saved to: {}", args.path.display());
    Ok(())
}
