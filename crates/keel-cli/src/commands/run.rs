//! `keel run` — resolve a module on the given roots and run its entry function.

use keel_runtime::{Bootstrap, BootstrapOptions};
use tracing::debug;

use super::{parse_roots, scan_policy};

pub struct RunArgs {
    pub paths: Vec<String>,
    pub skip_unavailable: bool,
    pub no_verify: bool,
    pub name: String,
    pub args: Vec<String>,
}

impl RunArgs {
    fn options(&self) -> BootstrapOptions {
        BootstrapOptions {
            scan_policy: scan_policy(self.skip_unavailable),
            verify: !self.no_verify,
        }
    }
}

pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    let roots = parse_roots(&args.paths);
    if roots.is_empty() {
        anyhow::bail!("No roots given; pass at least one with -p");
    }
    let options = args.options();
    debug!(roots = roots.len(), ?options, "Running {}", args.name);

    Bootstrap::system(options).run(roots, &args.name, &args.args)?;
    Ok(())
}
