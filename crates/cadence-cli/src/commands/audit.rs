use cadence_core::{audit, Severity};
use clap::Args;

use super::{load_snapshot, ClockArgs, CliResult, SnapshotArgs};

#[derive(Args)]
pub struct AuditArgs {
    #[command(flatten)]
    pub snapshot: SnapshotArgs,
    #[command(flatten)]
    pub clock: ClockArgs,
    /// Exit with an error when any warning is found
    #[arg(long)]
    pub strict: bool,
}

pub fn run(args: AuditArgs) -> CliResult {
    let state = load_snapshot(&args.snapshot)?;
    let findings = audit(&state, args.clock.now());
    println!("{}", serde_json::to_string_pretty(&findings)?);

    let warnings = findings.iter().filter(|f| f.severity == Severity::Warning).count();
    if args.strict && warnings > 0 {
        return Err(format!("{warnings} warning(s) found").into());
    }
    Ok(())
}
